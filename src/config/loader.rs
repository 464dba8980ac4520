//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the optional file, layer environment overrides on top, then validate.
pub fn load_layered<F>(path: Option<&Path>, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the deployment environment variables on top of `config`.
///
/// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).map(|v| v.trim().to_string());

    if let Some(cors) = get("ALLOWED_ORIGINS") {
        config.security.cors_origins = split_list(&cors);
        // The frontend allow-list inherits the CORS list unless set on its own.
        config.security.allowed_frontend_origins = split_list(&cors);
    }
    if let Some(frontends) = get("ALLOWED_FRONTEND_ORIGINS") {
        config.security.allowed_frontend_origins = split_list(&frontends);
    }

    if let Some(v) = get("REQUIRE_SIGNED_REQUESTS") {
        config.signing.enabled = parse_bool(&v);
    }
    if let Some(v) = get("SIGNATURE_ALGORITHM") {
        config.signing.algorithm = v.to_lowercase();
    }
    if let Some(v) = get("FRONTEND_KEY_ID") {
        config.signing.key_id = v;
    }
    if let Some(v) = get("FRONTEND_PUBLIC_KEY_PEM") {
        config.signing.public_key_pem = v;
    }
    if let Some(v) = get("SIGNATURE_MAX_AGE_SECONDS") {
        config.signing.max_age_secs = parse_number("SIGNATURE_MAX_AGE_SECONDS", &v)?;
    }

    if let Some(v) = get("REQUIRE_TURNSTILE") {
        config.challenge.enabled = parse_bool(&v);
    }
    if let Some(v) = get("TURNSTILE_SECRET_KEY") {
        config.challenge.secret_key = v;
    }
    if let Some(v) = get("TURNSTILE_VERIFY_URL") {
        config.challenge.verify_url = v;
    }

    if let Some(v) = get("REDIS_URL") {
        config.shared_store.url = v;
    }
    if let Some(v) = get("REDIS_RATE_LIMIT_PREFIX") {
        config.shared_store.rate_limit_prefix = v;
    }
    if let Some(v) = get("REDIS_NONCE_PREFIX") {
        config.shared_store.nonce_prefix = v;
    }

    if let Some(v) = get("RATE_LIMIT_MAX_REQUESTS") {
        config.rate_limit.max_requests = parse_number("RATE_LIMIT_MAX_REQUESTS", &v)?;
    }
    if let Some(v) = get("RATE_LIMIT_WINDOW_SECONDS") {
        config.rate_limit.window_secs = parse_number("RATE_LIMIT_WINDOW_SECONDS", &v)?;
    }

    if let Some(v) = get("OUTPUT_DIR") {
        config.storage.output_dir = PathBuf::from(v);
    }
    if let Some(v) = get("TEMP_DIR") {
        config.storage.temp_dir = PathBuf::from(v);
    }
    if let Some(v) = get("VOICES_DIR") {
        config.storage.voices_dir = PathBuf::from(v);
    }
    if let Some(v) = get("VOICES_DB") {
        config.storage.catalog_path = PathBuf::from(v);
    }

    if let Some(v) = get("PORT") {
        let port: u16 = parse_number("PORT", &v)?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }

    Ok(())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: e.to_string(),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
