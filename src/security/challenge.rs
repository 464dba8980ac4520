//! Human-verification challenge tokens.
//!
//! # Data Flow
//! ```text
//! protected POST
//!     → extract_token (header → form field → JSON field)
//!     → ChallengeVerifier::verify
//!         → ChallengeService::siteverify (form POST, bounded by timeout)
//!         → success == true ? allow : ChallengeVerificationFailed
//! ```
//!
//! Every failure talking to the service rejects the request.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, HeaderMap, Request};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::security::rejection::Rejection;

pub const TOKEN_HEADER: &str = "x-turnstile-token";
pub const TOKEN_FIELD: &str = "turnstile_token";

/// Reported when the service said no without saying why.
const DEFAULT_FAILURE_CODE: &str = "challenge-validation-failed";

/// Answer of the verification endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChallengeResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("challenge service request failed: {0}")]
    Transport(String),

    #[error("challenge service did not answer in time")]
    Timeout,

    #[error("challenge service returned an unreadable response: {0}")]
    Malformed(String),
}

impl ChallengeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "verification-unavailable",
            Self::Timeout => "verification-timeout",
            Self::Malformed(_) => "verification-malformed-response",
        }
    }
}

/// The external challenge service.
#[async_trait]
pub trait ChallengeService: Send + Sync {
    async fn siteverify(
        &self,
        secret: &str,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<ChallengeResponse, ChallengeError>;
}

/// HTTP client for a siteverify-style endpoint.
pub struct HttpChallengeService {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpChallengeService {
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self, ChallengeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChallengeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            verify_url: verify_url.into(),
        })
    }
}

#[async_trait]
impl ChallengeService for HttpChallengeService {
    async fn siteverify(
        &self,
        secret: &str,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<ChallengeResponse, ChallengeError> {
        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChallengeError::Timeout
                } else {
                    ChallengeError::Transport(e.to_string())
                }
            })?;

        response.json::<ChallengeResponse>().await.map_err(|e| {
            if e.is_timeout() {
                ChallengeError::Timeout
            } else {
                ChallengeError::Malformed(e.to_string())
            }
        })
    }
}

/// Find the challenge token: dedicated header, then form field, then JSON field.
pub async fn extract_token(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    if let Some(token) = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(token.to_string());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let token = match mime.as_str() {
        "application/x-www-form-urlencoded" => url::form_urlencoded::parse(body)
            .find(|(key, _)| key == TOKEN_FIELD)
            .map(|(_, value)| value.into_owned()),
        "multipart/form-data" => multipart_field(content_type, body.clone()).await,
        m if m == "application/json" || m.ends_with("+json") => {
            serde_json::from_slice::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get(TOKEN_FIELD)?.as_str().map(String::from))
        }
        _ => None,
    };

    token.filter(|t| !t.trim().is_empty())
}

async fn multipart_field(content_type: &str, body: Bytes) -> Option<String> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .ok()?;
    let mut multipart = Multipart::from_request(request, &()).await.ok()?;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some(TOKEN_FIELD) {
            return field.text().await.ok();
        }
    }
    None
}

/// Verifies tokens against the configured service with the shared secret.
#[derive(Clone)]
pub struct ChallengeVerifier {
    service: Arc<dyn ChallengeService>,
    secret: String,
}

impl ChallengeVerifier {
    pub fn new(service: Arc<dyn ChallengeService>, secret: impl Into<String>) -> Self {
        Self {
            service,
            secret: secret.into(),
        }
    }

    pub async fn verify(&self, token: Option<&str>, client_ip: Option<&str>) -> Result<(), Rejection> {
        let token = token.ok_or(Rejection::ChallengeTokenMissing)?;

        if self.secret.is_empty() {
            tracing::error!("Challenge enforcement is enabled but no secret is configured");
            return Err(Rejection::ChallengeVerificationFailed {
                error_codes: vec!["missing-input-secret".to_string()],
            });
        }

        match self.service.siteverify(&self.secret, token, client_ip).await {
            Ok(response) if response.success => Ok(()),
            Ok(response) => {
                let error_codes = if response.error_codes.is_empty() {
                    vec![DEFAULT_FAILURE_CODE.to_string()]
                } else {
                    response.error_codes
                };
                tracing::info!(codes = ?error_codes, "Challenge token rejected");
                Err(Rejection::ChallengeVerificationFailed { error_codes })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Challenge service unavailable, rejecting request");
                Err(Rejection::ChallengeVerificationFailed {
                    error_codes: vec![e.code().to_string()],
                })
            }
        }
    }
}

impl std::fmt::Debug for ChallengeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeVerifier")
            .field("secret_configured", &!self.secret.is_empty())
            .finish()
    }
}
