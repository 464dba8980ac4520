use clap::{Parser, Subcommand};
use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::SigningKey;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::path::PathBuf;

use tts_gateway::clock::{Clock, SystemClock};
use tts_gateway::security::challenge::TOKEN_HEADER;
use tts_gateway::security::signature::SignatureHeaders;

#[derive(Parser)]
#[command(name = "tts-sign")]
#[command(about = "Key and request-signing tool for the TTS gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RequestArgs {
    /// PKCS#8 PEM private key file
    #[arg(short, long, env = "FRONTEND_PRIVATE_KEY_PATH")]
    key: PathBuf,

    #[arg(long, env = "FRONTEND_KEY_ID", default_value = "tts-frontend")]
    key_id: String,

    #[arg(short = 'X', long, default_value = "POST")]
    method: String,

    /// Request path, without query string. Encoded or decoded form both sign
    /// the same.
    path: String,

    /// Request body
    #[arg(short, long, conflicts_with = "body_file")]
    data: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    body_file: Option<PathBuf>,
}

impl RequestArgs {
    fn body(&self) -> std::io::Result<Vec<u8>> {
        match (&self.data, &self.body_file) {
            (Some(data), _) => Ok(data.clone().into_bytes()),
            (None, Some(file)) => std::fs::read(file),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn sign(&self, body: &[u8]) -> Result<SignatureHeaders, Box<dyn std::error::Error>> {
        let pem = std::fs::read_to_string(&self.key)?;
        let key = SigningKey::from_pkcs8_pem(&pem)
            .map_err(|e| format!("invalid private key {}: {}", self.key.display(), e))?;
        let nonce = uuid::Uuid::new_v4().to_string();
        Ok(SignatureHeaders::sign(
            &key,
            &self.key_id,
            &self.method.to_ascii_uppercase(),
            &self.path,
            SystemClock.now(),
            &nonce,
            body,
        ))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an Ed25519 key pair
    Keygen {
        /// Write the private key here instead of stdout
        #[arg(long)]
        private_out: Option<PathBuf>,
    },
    /// Print signing headers for a request
    Sign(RequestArgs),
    /// Sign and send a request
    Send {
        #[command(flatten)]
        request: RequestArgs,

        #[arg(short, long, default_value = "http://localhost:4000")]
        url: String,

        #[arg(long, default_value = "application/json")]
        content_type: String,

        #[arg(long)]
        turnstile_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { private_out } => {
            let key = SigningKey::generate(&mut rand::rngs::OsRng);
            let private_pem = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| format!("could not encode private key: {}", e))?;
            let public_pem = key
                .verifying_key()
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| format!("could not encode public key: {}", e))?;

            match private_out {
                Some(path) => {
                    std::fs::write(&path, private_pem.as_bytes())?;
                    eprintln!("Private key written to {}", path.display());
                }
                None => print!("{}", private_pem.as_str()),
            }
            print!("{}", public_pem);
        }
        Commands::Sign(request) => {
            let signed = request.sign(&request.body()?)?;
            for (name, value) in signed.pairs() {
                println!("{}: {}", name, value);
            }
        }
        Commands::Send {
            request,
            url,
            content_type,
            turnstile_token,
        } => {
            let body = request.body()?;
            let signed = request.sign(&body)?;

            let mut headers = HeaderMap::new();
            for (name, value) in signed.pairs() {
                headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
            }
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
            if let Some(token) = turnstile_token {
                headers.insert(HeaderName::from_static(TOKEN_HEADER), HeaderValue::from_str(&token)?);
            }

            let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())?;
            let res = reqwest::Client::new()
                .request(method, format!("{}{}", url.trim_end_matches('/'), request.path))
                .headers(headers)
                .body(body)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let is_json = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }

    if is_json {
        let json: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        let bytes = res.bytes().await?;
        println!("{} ({} bytes)", status, bytes.len());
    }
    Ok(())
}
