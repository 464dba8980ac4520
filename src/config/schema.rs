//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Origin allow-lists and body limits.
    pub security: SecurityConfig,

    /// Frontend request signing.
    pub signing: SigningConfig,

    /// Human-verification challenge.
    pub challenge: ChallengeConfig,

    /// Shared atomic store (Redis).
    pub shared_store: SharedStoreConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Filesystem locations.
    pub storage: StorageConfig,

    /// Synthesis engine and audio tooling.
    pub engine: EngineConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one request, synthesis included, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 900 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// "pretty" for development, "json" for production.
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Origin allow-lists and request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Frontends allowed in `Origin`/`Referer`.
    pub allowed_frontend_origins: Vec<String>,

    /// Origins answered by the CORS layer.
    pub cors_origins: Vec<String>,

    /// Maximum body size in bytes (audio uploads included).
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_frontend_origins: vec!["http://localhost:3000".to_string()],
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_body_size: 25 * 1024 * 1024, // 25MB
        }
    }
}

/// Frontend-to-gateway request signing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Require signed requests.
    pub enabled: bool,

    /// Signature algorithm. Only "ed25519" is supported.
    pub algorithm: String,

    /// Key id the frontend must present.
    pub key_id: String,

    /// SPKI PEM public key. Literal `\n` sequences are accepted.
    pub public_key_pem: String,

    /// Maximum signature age (and nonce lifetime) in seconds.
    pub max_age_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: "ed25519".to_string(),
            key_id: "tts-frontend".to_string(),
            public_key_pem: String::new(),
            max_age_secs: 300,
        }
    }
}

/// Human-verification challenge (Turnstile-compatible siteverify API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Require a challenge token on protected routes.
    pub enabled: bool,

    /// Shared secret sent to the verification service.
    pub secret_key: String,

    /// Verification endpoint.
    pub verify_url: String,

    /// Hard timeout for the verification call in seconds.
    pub timeout_secs: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_key: String::new(),
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
            timeout_secs: 8,
        }
    }
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SharedStoreConfig {
    /// Redis connection string. Empty disables the shared backend.
    pub url: String,

    /// Timeout for the initial connection in milliseconds.
    pub connect_timeout_ms: u64,

    /// Timeout for each store operation in milliseconds.
    pub op_timeout_ms: u64,

    /// Key prefix for nonce records.
    pub nonce_prefix: String,

    /// Key prefix for rate-limit windows.
    pub rate_limit_prefix: String,

    /// Interval of the local expiry sweep in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SharedStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connect_timeout_ms: 2_000,
            op_timeout_ms: 250,
            nonce_prefix: "tts:nonce".to_string(),
            rate_limit_prefix: "tts:rate".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum accepted requests per identifier per window.
    pub max_requests: u64,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 5,
            window_secs: 86_400,
        }
    }
}

/// Filesystem locations for uploads, outputs and the voice gallery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub voices_dir: PathBuf,
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            temp_dir: PathBuf::from("temp_uploads"),
            voices_dir: PathBuf::from("voice_gallery"),
            catalog_path: PathBuf::from("voices_db.json"),
        }
    }
}

/// Synthesis engine and audio tooling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Program invoked for each synthesis job.
    pub program: String,

    /// Fixed leading arguments (e.g. the engine script path).
    pub args: Vec<String>,

    /// Per-job timeout in seconds.
    pub timeout_secs: u64,

    /// Jobs allowed to run at once; the rest wait in line.
    pub max_concurrent_jobs: usize,

    /// Shortest accepted reference clip in seconds.
    pub min_reference_secs: f64,

    pub ffmpeg_program: String,
    pub ffprobe_program: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["tts_engine.py".to_string()],
            timeout_secs: 600,
            max_concurrent_jobs: 1,
            min_reference_secs: 2.0,
            ffmpeg_program: "ffmpeg".to_string(),
            ffprobe_program: "ffprobe".to_string(),
        }
    }
}
