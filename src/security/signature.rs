//! Detached Ed25519 request signatures.
//!
//! # Canonical digest
//! ```text
//! METHOD \n PATH \n TIMESTAMP \n NONCE \n hex(sha256(raw body))
//! ```
//! PATH is the URI path without the query string, percent-decoded (`%20` and a
//! literal space sign the same). Invalid UTF-8 after decoding is replaced with
//! U+FFFD. TIMESTAMP and NONCE are the header values exactly as sent (after
//! trimming surrounding whitespace).
//!
//! # Order of checks
//! key configured → headers present → key id → timestamp window → base64 →
//! signature → nonce registration. The nonce is only burned once the signature
//! has verified, so unsigned traffic cannot exhaust nonces of real clients.

use axum::http::{HeaderMap, Method};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::SigningConfig;
use crate::security::nonce::NonceRegistry;
use crate::security::rejection::Rejection;

pub const KEY_ID_HEADER: &str = "x-frontend-key-id";
pub const TIMESTAMP_HEADER: &str = "x-frontend-timestamp";
pub const NONCE_HEADER: &str = "x-frontend-nonce";
pub const SIGNATURE_HEADER: &str = "x-frontend-signature";

/// Supported signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Ed25519,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported signature algorithm '{0}' (only ed25519 is supported)")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for SignatureAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("ed25519") {
            Ok(Self::Ed25519)
        } else {
            Err(UnsupportedAlgorithm(s.to_string()))
        }
    }
}

/// Why the configured public key could not be used.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no public key configured")]
    Missing,

    #[error("invalid public key PEM: {0}")]
    Invalid(String),

    #[error(transparent)]
    Algorithm(#[from] UnsupportedAlgorithm),
}

/// Parse an SPKI PEM public key, expanding literal `\n` escapes first.
pub fn load_public_key(pem: &str) -> Result<VerifyingKey, KeyError> {
    let pem = pem.trim().replace("\\n", "\n");
    if pem.is_empty() {
        return Err(KeyError::Missing);
    }
    VerifyingKey::from_public_key_pem(&pem).map_err(|e| KeyError::Invalid(e.to_string()))
}

pub fn body_sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub fn canonical_digest(method: &str, path: &str, timestamp: &str, nonce: &str, body: &[u8]) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method,
        percent_decode_str(path).decode_utf8_lossy(),
        timestamp,
        nonce,
        body_sha256_hex(body)
    )
}

/// The four signing headers, as a client sends them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub key_id: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

impl SignatureHeaders {
    /// Sign a request the way the frontend does.
    pub fn sign(
        key: &SigningKey,
        key_id: &str,
        method: &str,
        path: &str,
        timestamp: u64,
        nonce: &str,
        body: &[u8],
    ) -> Self {
        let timestamp = timestamp.to_string();
        let digest = canonical_digest(method, path, &timestamp, nonce, body);
        let signature = key.sign(digest.as_bytes());
        Self {
            key_id: key_id.to_string(),
            timestamp,
            nonce: nonce.to_string(),
            signature: STANDARD.encode(signature.to_bytes()),
        }
    }

    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            (KEY_ID_HEADER, self.key_id.as_str()),
            (TIMESTAMP_HEADER, self.timestamp.as_str()),
            (NONCE_HEADER, self.nonce.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
        ]
    }
}

/// A request's signing material, alive only while it is being checked.
struct SignedRequestContext<'a> {
    key_id: &'a str,
    nonce: &'a str,
    signature: Vec<u8>,
    digest: String,
}

/// Verifies signatures and enforces single use of each nonce.
pub struct RequestAuthenticator {
    key_id: String,
    verifying_key: Option<VerifyingKey>,
    max_age_secs: u64,
    nonces: NonceRegistry,
    clock: Arc<dyn Clock>,
}

impl RequestAuthenticator {
    /// Build from config. A key that fails to load is logged here, once, and
    /// every signed request is then rejected with `SignatureConfigError`.
    pub fn new(config: &SigningConfig, nonces: NonceRegistry, clock: Arc<dyn Clock>) -> Self {
        let verifying_key = config
            .algorithm
            .parse::<SignatureAlgorithm>()
            .map_err(KeyError::from)
            .and_then(|_| load_public_key(&config.public_key_pem));

        let verifying_key = match verifying_key {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Signed requests are required but verification is misconfigured; rejecting signed routes"
                );
                None
            }
        };

        Self {
            key_id: config.key_id.trim().to_string(),
            verifying_key,
            max_age_secs: config.max_age_secs,
            nonces,
            clock,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.verifying_key.is_some()
    }

    pub async fn verify(
        &self,
        method: &Method,
        path: &str,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<(), Rejection> {
        let verifying_key = self.verifying_key.as_ref().ok_or(Rejection::SignatureConfigError)?;

        let (Some(key_id), Some(timestamp), Some(nonce), Some(signature)) = (
            header(headers, KEY_ID_HEADER),
            header(headers, TIMESTAMP_HEADER),
            header(headers, NONCE_HEADER),
            header(headers, SIGNATURE_HEADER),
        ) else {
            return Err(Rejection::MissingSignatureHeaders);
        };

        if key_id != self.key_id {
            return Err(Rejection::InvalidKeyId);
        }

        let issued_at: i64 = timestamp.parse().map_err(|_| Rejection::InvalidTimestamp)?;
        let now = self.clock.now() as i64;
        if now.abs_diff(issued_at) > self.max_age_secs {
            return Err(Rejection::ExpiredSignature);
        }

        let context = SignedRequestContext {
            key_id,
            nonce,
            signature: STANDARD
                .decode(signature)
                .map_err(|_| Rejection::InvalidSignatureEncoding)?,
            digest: canonical_digest(method.as_str(), path, timestamp, nonce, body),
        };

        let signature =
            Signature::from_slice(&context.signature).map_err(|_| Rejection::InvalidSignature)?;
        verifying_key
            .verify_strict(context.digest.as_bytes(), &signature)
            .map_err(|_| Rejection::InvalidSignature)?;

        if !self.nonces.register(context.key_id, context.nonce).await {
            tracing::warn!(key_id = %context.key_id, "Replayed nonce rejected");
            return Err(Rejection::ReplayedNonce);
        }

        Ok(())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{LocalStore, StoreSet};
    use axum::http::HeaderValue;
    use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, EncodePublicKey};
    use std::time::Duration;

    const NOW: u64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"text":"hola"}"#;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn authenticator_with(pem: String, clock: Arc<ManualClock>) -> RequestAuthenticator {
        let config = SigningConfig {
            public_key_pem: pem,
            ..SigningConfig::default()
        };
        let stores = StoreSet::local_only(Arc::new(LocalStore::new(clock.clone())));
        let nonces = NonceRegistry::new(stores, "tts:nonce", Duration::from_secs(config.max_age_secs));
        RequestAuthenticator::new(&config, nonces, clock)
    }

    fn authenticator() -> (RequestAuthenticator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let pem = signing_key()
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (authenticator_with(pem, clock.clone()), clock)
    }

    fn to_headers(signed: &SignatureHeaders) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in signed.pairs() {
            headers.insert(name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn signed(nonce: &str) -> HeaderMap {
        to_headers(&SignatureHeaders::sign(
            &signing_key(),
            "tts-frontend",
            "POST",
            "/voices/abc/use",
            NOW,
            nonce,
            BODY,
        ))
    }

    #[test]
    fn test_canonical_digest_layout() {
        let digest = canonical_digest("POST", "/clone", "1700000000", "n-1", b"");
        assert_eq!(
            digest,
            "POST\n/clone\n1700000000\nn-1\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_uses_decoded_path() {
        let encoded = canonical_digest("POST", "/voices/caf%C3%A9%20v2/use", "1", "n", b"");
        let decoded = canonical_digest("POST", "/voices/café v2/use", "1", "n", b"");
        assert_eq!(encoded, decoded);
        assert!(encoded.starts_with("POST\n/voices/café v2/use\n"));
    }

    #[tokio::test]
    async fn test_encoded_request_path_verifies_against_decoded_signature() {
        let (auth, _) = authenticator();
        let headers = to_headers(&SignatureHeaders::sign(
            &signing_key(),
            "tts-frontend",
            "POST",
            "/voices/a b/use",
            NOW,
            "n-space",
            BODY,
        ));
        assert_eq!(auth.verify(&Method::POST, "/voices/a%20b/use", BODY, &headers).await, Ok(()));
    }

    #[test]
    fn test_algorithm_selector() {
        assert_eq!("ed25519".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Ed25519));
        assert_eq!(" ED25519 ".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Ed25519));
        assert!("ecdsa-p256".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_pem_with_escaped_newlines() {
        let pem = signing_key()
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let escaped = pem.replace('\n', "\\n");
        assert_eq!(load_public_key(&escaped).unwrap(), signing_key().verifying_key());
        assert!(matches!(load_public_key("   "), Err(KeyError::Missing)));
        assert!(matches!(load_public_key("not a key"), Err(KeyError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_valid_signature_accepted_once() {
        let (auth, _) = authenticator();
        let headers = signed("nonce-1");

        assert_eq!(auth.verify(&Method::POST, "/voices/abc/use", BODY, &headers).await, Ok(()));
        assert_eq!(
            auth.verify(&Method::POST, "/voices/abc/use", BODY, &headers).await,
            Err(Rejection::ReplayedNonce)
        );
    }

    #[tokio::test]
    async fn test_tampering_any_field_fails() {
        let (auth, _) = authenticator();
        let path = "/voices/abc/use";

        // Method
        let r = auth.verify(&Method::PUT, path, BODY, &signed("t-1")).await;
        assert_eq!(r, Err(Rejection::InvalidSignature));

        // Path
        let r = auth.verify(&Method::POST, "/voices/abd/use", BODY, &signed("t-2")).await;
        assert_eq!(r, Err(Rejection::InvalidSignature));

        // Body, one byte flipped
        let mut body = BODY.to_vec();
        body[3] ^= 0x01;
        let r = auth.verify(&Method::POST, path, &body, &signed("t-3")).await;
        assert_eq!(r, Err(Rejection::InvalidSignature));

        // Timestamp, still inside the window
        let mut headers = signed("t-4");
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from(NOW + 1));
        let r = auth.verify(&Method::POST, path, BODY, &headers).await;
        assert_eq!(r, Err(Rejection::InvalidSignature));

        // Nonce
        let mut headers = signed("t-5");
        headers.insert(NONCE_HEADER, HeaderValue::from_static("t-6"));
        let r = auth.verify(&Method::POST, path, BODY, &headers).await;
        assert_eq!(r, Err(Rejection::InvalidSignature));
    }

    #[tokio::test]
    async fn test_failed_signature_does_not_burn_nonce() {
        let (auth, _) = authenticator();
        let path = "/voices/abc/use";

        let mut forged = signed("shared-nonce");
        forged.insert(SIGNATURE_HEADER, HeaderValue::from_str(&STANDARD.encode([0u8; 64])).unwrap());
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &forged).await,
            Err(Rejection::InvalidSignature)
        );

        assert_eq!(auth.verify(&Method::POST, path, BODY, &signed("shared-nonce")).await, Ok(()));
    }

    #[tokio::test]
    async fn test_header_checks() {
        let (auth, _) = authenticator();
        let path = "/voices/abc/use";

        let mut headers = signed("h-1");
        headers.remove(NONCE_HEADER);
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &headers).await,
            Err(Rejection::MissingSignatureHeaders)
        );

        let mut headers = signed("h-2");
        headers.insert(KEY_ID_HEADER, HeaderValue::from_static("someone-else"));
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &headers).await,
            Err(Rejection::InvalidKeyId)
        );

        let mut headers = signed("h-3");
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("yesterday"));
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &headers).await,
            Err(Rejection::InvalidTimestamp)
        );

        let mut headers = signed("h-4");
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("!!not base64!!"));
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &headers).await,
            Err(Rejection::InvalidSignatureEncoding)
        );

        let mut headers = signed("h-5");
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("c2hvcnQ="));
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &headers).await,
            Err(Rejection::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn test_timestamp_window_is_symmetric() {
        let (auth, clock) = authenticator();
        let path = "/voices/abc/use";

        // Signed at NOW; server clock 300s ahead is still fine, 301s is not.
        clock.set(NOW + 300);
        assert_eq!(auth.verify(&Method::POST, path, BODY, &signed("w-1")).await, Ok(()));
        clock.set(NOW + 301);
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &signed("w-2")).await,
            Err(Rejection::ExpiredSignature)
        );

        // Server clock behind the signer.
        clock.set(NOW - 300);
        assert_eq!(auth.verify(&Method::POST, path, BODY, &signed("w-3")).await, Ok(()));
        clock.set(NOW - 301);
        assert_eq!(
            auth.verify(&Method::POST, path, BODY, &signed("w-4")).await,
            Err(Rejection::ExpiredSignature)
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_closed() {
        let auth = authenticator_with(String::new(), Arc::new(ManualClock::new(NOW)));
        assert!(!auth.is_configured());
        assert_eq!(
            auth.verify(&Method::POST, "/voices/abc/use", BODY, &signed("k-1")).await,
            Err(Rejection::SignatureConfigError)
        );
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let clock = Arc::new(ManualClock::new(NOW));
        let other = SigningKey::from_bytes(&[9u8; 32])
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let auth = authenticator_with(other, clock);
        assert_eq!(
            auth.verify(&Method::POST, "/voices/abc/use", BODY, &signed("k-2")).await,
            Err(Rejection::InvalidSignature)
        );
    }
}
