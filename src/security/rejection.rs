//! Pipeline rejection taxonomy.
//!
//! Every gate returns one of these on veto. The HTTP rendering is a small JSON
//! body with the categorized message only; details stay in the logs.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Counters reported when a client runs out of quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDetails {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    pub retry_after_seconds: u64,
    pub window_seconds: u64,
    pub identifier: String,
}

/// Terminal verdict of a failed gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Origin not allowed")]
    OriginRejected,

    #[error("Referer not allowed")]
    RefererRejected,

    #[error("Signed requests required but signature verification is not configured")]
    SignatureConfigError,

    #[error("Missing signature headers")]
    MissingSignatureHeaders,

    #[error("Invalid key id")]
    InvalidKeyId,

    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Signature expired")]
    ExpiredSignature,

    #[error("Nonce already used")]
    ReplayedNonce,

    #[error("Invalid signature encoding")]
    InvalidSignatureEncoding,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Challenge token required")]
    ChallengeTokenMissing,

    #[error("Challenge verification failed: {}", .error_codes.join(","))]
    ChallengeVerificationFailed { error_codes: Vec<String> },

    #[error("Request limit reached for this window")]
    RateLimitExceeded(RateLimitDetails),

    #[error("Request body too large")]
    PayloadTooLarge,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OriginRejected | Self::RefererRejected => StatusCode::FORBIDDEN,
            Self::SignatureConfigError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingSignatureHeaders
            | Self::InvalidKeyId
            | Self::InvalidTimestamp
            | Self::ExpiredSignature
            | Self::ReplayedNonce
            | Self::InvalidSignatureEncoding
            | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::ChallengeTokenMissing | Self::ChallengeVerificationFailed { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Stable machine-readable name, also used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OriginRejected => "origin_rejected",
            Self::RefererRejected => "referer_rejected",
            Self::SignatureConfigError => "signature_config_error",
            Self::MissingSignatureHeaders => "missing_signature_headers",
            Self::InvalidKeyId => "invalid_key_id",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::ExpiredSignature => "expired_signature",
            Self::ReplayedNonce => "replayed_nonce",
            Self::InvalidSignatureEncoding => "invalid_signature_encoding",
            Self::InvalidSignature => "invalid_signature",
            Self::ChallengeTokenMissing => "challenge_token_missing",
            Self::ChallengeVerificationFailed { .. } => "challenge_verification_failed",
            Self::RateLimitExceeded(_) => "rate_limit_exceeded",
            Self::PayloadTooLarge => "payload_too_large",
        }
    }

    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.kind(),
        });
        match self {
            Self::RateLimitExceeded(details) => {
                if let (Some(map), Ok(serde_json::Value::Object(extra))) =
                    (body.as_object_mut(), serde_json::to_value(details))
                {
                    map.extend(extra);
                }
            }
            Self::ChallengeVerificationFailed { error_codes } => {
                body["error_codes"] = json!(error_codes);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let Self::RateLimitExceeded(details) = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(details.retry_after_seconds),
            );
        }
        response
    }
}
