//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    routing::post,
    Form, Json, Router,
};
use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, EncodePublicKey};
use ed25519_dalek::SigningKey;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

use tts_gateway::clock::{Clock, ManualClock};
use tts_gateway::config::GatewayConfig;
use tts_gateway::engine::{
    AudioError, AudioToolkit, EngineError, EngineResult, SynthesisEngine, SynthesisRequest,
};
use tts_gateway::http::{build_router, AppState, Collaborators};
use tts_gateway::security::challenge::HttpChallengeService;
use tts_gateway::security::signature::SignatureHeaders;
use tts_gateway::store::{AtomicStore, LocalStore, StoreError, StoreResult, StoreSet};

pub const START: u64 = 1_700_000_000;
pub const KEY_ID: &str = "tts-frontend";
pub const ORIGIN: &str = "https://app.example";
pub const GOOD_TOKEN: &str = "human-token";
pub const CHALLENGE_SECRET: &str = "test-secret";
pub const FAKE_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

pub fn public_key_pem() -> String {
    signing_key()
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap()
}

/// Shared store double with real semantics that can be switched off.
///
/// The crate's unit tests have a richer `store::testing::FlakyStore` with
/// per-operation failures; it is `#[cfg(test)]` and not visible from here.
#[derive(Debug)]
pub struct FlakyStore {
    inner: LocalStore,
    available: AtomicBool,
}

impl FlakyStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: LocalStore::new(clock),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Timeout(Duration::from_millis(250)))
        }
    }
}

#[async_trait]
impl AtomicStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        Ok(self.inner.set_if_absent_now(key, ttl))
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        self.check()?;
        Ok(self.inner.increment_with_expiry_now(key, ttl))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<i64>> {
        self.check()?;
        Ok(self.inner.ttl_now(key))
    }

    async fn count_prefix(&self, prefix: &str) -> StoreResult<usize> {
        self.check()?;
        Ok(self.inner.count_prefix_now(prefix))
    }
}

/// Engine double that writes a fixed WAV header and records requests.
#[derive(Debug, Default)]
pub struct StubEngine {
    pub requests: Mutex<Vec<SynthesisRequest>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl SynthesisEngine for StubEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<PathBuf> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Failed("model crashed".to_string()));
        }
        tokio::fs::write(&request.output_path, FAKE_WAV)
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        Ok(request.output_path.clone())
    }
}

/// Audio double: conversion copies, duration is fixed.
#[derive(Debug)]
pub struct StubAudio {
    pub duration: Mutex<f64>,
    pub conversions: AtomicUsize,
}

impl Default for StubAudio {
    fn default() -> Self {
        Self {
            duration: Mutex::new(4.256),
            conversions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioToolkit for StubAudio {
    async fn convert_to_wav(&self, input: &Path, output: &Path) -> Result<(), AudioError> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        tokio::fs::copy(input, output)
            .await
            .map(|_| ())
            .map_err(|e| AudioError::Conversion(e.to_string()))
    }

    async fn duration_secs(&self, _path: &Path) -> Result<f64, AudioError> {
        Ok(*self.duration.lock().unwrap())
    }
}

/// Mock human-verification service on a local port.
pub struct MockChallenge {
    pub url: String,
    pub calls: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

pub async fn start_mock_challenge() -> MockChallenge {
    async fn siteverify(
        State(calls): State<Arc<Mutex<Vec<HashMap<String, String>>>>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        calls.lock().unwrap().push(form.clone());
        let valid = form.get("secret").map(String::as_str) == Some(CHALLENGE_SECRET)
            && form.get("response").map(String::as_str) == Some(GOOD_TOKEN);
        if valid {
            Json(json!({ "success": true }))
        } else {
            Json(json!({
                "success": false,
                "error-codes": ["invalid-input-response", "timeout-or-duplicate"],
            }))
        }
    }

    let calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/siteverify", post(siteverify))
        .with_state(calls.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockChallenge {
        url: format!("http://{}/siteverify", addr),
        calls,
    }
}

/// A fully wired router with test doubles behind it.
pub struct TestGateway {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub shared: Arc<FlakyStore>,
    pub engine: Arc<StubEngine>,
    pub audio: Arc<StubAudio>,
    pub challenge: MockChallenge,
    pub config: GatewayConfig,
    pub dir: TempDir,
}

pub fn base_config(dir: &Path, challenge_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.security.allowed_frontend_origins = vec![ORIGIN.to_string()];
    config.security.cors_origins = vec![ORIGIN.to_string()];
    config.signing.public_key_pem = public_key_pem();
    config.signing.key_id = KEY_ID.to_string();
    config.challenge.secret_key = CHALLENGE_SECRET.to_string();
    config.challenge.verify_url = challenge_url.to_string();
    config.challenge.timeout_secs = 2;
    config.rate_limit.max_requests = 5;
    config.rate_limit.window_secs = 60;
    config.storage.output_dir = dir.join("outputs");
    config.storage.temp_dir = dir.join("temp_uploads");
    config.storage.voices_dir = dir.join("voice_gallery");
    config.storage.catalog_path = dir.join("voices_db.json");
    config
}

impl TestGateway {
    pub async fn start(tweak: impl FnOnce(&mut GatewayConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let challenge = start_mock_challenge().await;
        let mut config = base_config(dir.path(), &challenge.url);
        tweak(&mut config);

        for d in [
            &config.storage.output_dir,
            &config.storage.temp_dir,
            &config.storage.voices_dir,
        ] {
            std::fs::create_dir_all(d).unwrap();
        }

        let clock = Arc::new(ManualClock::new(START));
        let shared = Arc::new(FlakyStore::new(clock.clone()));
        let stores = StoreSet::new(
            Some(shared.clone() as Arc<dyn AtomicStore>),
            Arc::new(LocalStore::new(clock.clone())),
        );

        let engine = Arc::new(StubEngine::default());
        let audio = Arc::new(StubAudio::default());
        let collaborators = Collaborators {
            engine: engine.clone(),
            audio: audio.clone(),
            challenge: Arc::new(
                HttpChallengeService::new(challenge.url.clone(), Duration::from_secs(2)).unwrap(),
            ),
        };

        let state = AppState::new(config.clone(), stores, collaborators, clock.clone());
        Self {
            router: build_router(state),
            clock,
            shared,
            engine,
            audio,
            challenge,
            config,
            dir,
        }
    }

    /// Build a request signed over exactly `body`, from client 1.2.3.4.
    pub fn signed(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        nonce: &str,
        extra: &[(&str, &str)],
    ) -> Request<Body> {
        let signed = SignatureHeaders::sign(
            &signing_key(),
            KEY_ID,
            method.as_str(),
            path.split('?').next().unwrap_or(path),
            self.clock.now(),
            nonce,
            &body,
        );

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("x-forwarded-for", "1.2.3.4");
        for (name, value) in signed.pairs() {
            builder = builder.header(name, value);
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }
}

pub fn json_body(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        panic!("expected JSON, got {:?}", String::from_utf8_lossy(bytes))
    })
}

pub const BOUNDARY: &str = "gateway-test-boundary";

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Encode text fields plus an optional `audio` file part.
pub fn multipart_body(fields: &[(&str, &str)], audio: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = audio {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
