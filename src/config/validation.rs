//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, timeouts > 0, addresses parse)
//! - Reject unsupported signature algorithms outright
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - A missing public key is not a startup error: the authenticator rejects
//!   signed traffic with a 500 instead

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::security::signature::SignatureAlgorithm;

/// One failed semantic check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("'{}' is not one of: pretty, json", config.observability.log_format),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    for origin in &config.security.allowed_frontend_origins {
        if let Some(message) = origin_problem(origin) {
            errors.push(ValidationError::new("security.allowed_frontend_origins", message));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if let Err(e) = config.signing.algorithm.parse::<SignatureAlgorithm>() {
        errors.push(ValidationError::new("signing.algorithm", e.to_string()));
    }

    if config.signing.max_age_secs == 0 {
        errors.push(ValidationError::new("signing.max_age_secs", "must be greater than 0"));
    }

    if config.signing.enabled && config.signing.key_id.trim().is_empty() {
        errors.push(ValidationError::new("signing.key_id", "required when signing is enabled"));
    }

    if url::Url::parse(&config.challenge.verify_url).is_err() {
        errors.push(ValidationError::new(
            "challenge.verify_url",
            format!("'{}' is not a URL", config.challenge.verify_url),
        ));
    }

    if config.challenge.timeout_secs == 0 {
        errors.push(ValidationError::new("challenge.timeout_secs", "must be greater than 0"));
    }

    if !config.shared_store.url.is_empty() {
        match url::Url::parse(&config.shared_store.url) {
            Ok(url) if matches!(url.scheme(), "redis" | "rediss" | "redis+unix" | "unix") => {}
            _ => errors.push(ValidationError::new(
                "shared_store.url",
                "must be a redis://, rediss:// or unix:// URL",
            )),
        }
    }

    if config.shared_store.op_timeout_ms == 0 {
        errors.push(ValidationError::new("shared_store.op_timeout_ms", "must be greater than 0"));
    }

    if config.shared_store.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "shared_store.sweep_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }

    if config.engine.max_concurrent_jobs == 0 {
        errors.push(ValidationError::new("engine.max_concurrent_jobs", "must be greater than 0"));
    }

    if config.engine.timeout_secs == 0 {
        errors.push(ValidationError::new("engine.timeout_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Origins are compared byte-for-byte against the `Origin` header, so they
/// must look exactly like one: scheme and host, no path or trailing slash.
fn origin_problem(origin: &str) -> Option<String> {
    match url::Url::parse(origin) {
        Err(_) => Some(format!("'{}' is not a URL", origin)),
        Ok(_) if origin.ends_with('/') => Some(format!("'{}' must not end with '/'", origin)),
        Ok(url) if url.path() != "/" => Some(format!("'{}' must not contain a path", origin)),
        Ok(_) => None,
    }
}
