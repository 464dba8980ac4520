//! Handler error responses.
//!
//! # Design Decisions
//! - Every error is a JSON `{"error": ...}` body
//! - Client mistakes echo a short reason; internal failures are logged in full
//!   and answered with a category only

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::{AudioError, EngineError};
use crate::voices::CatalogError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Engine(EngineError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Engine(EngineError::Spawn(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Audio(AudioError::Conversion(_)) => StatusCode::BAD_REQUEST,
            Self::Engine(_) | Self::Audio(_) | Self::Catalog(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::BadRequest(m) => m.clone(),
            Self::NotFound(m) => (*m).to_string(),
            Self::Engine(EngineError::Timeout(_)) => "Synthesis timed out".to_string(),
            Self::Engine(_) => "Synthesis failed".to_string(),
            Self::Audio(AudioError::Conversion(_)) => "Error converting audio format".to_string(),
            Self::Audio(_) => "Could not read audio".to_string(),
            Self::Catalog(_) | Self::Io(_) => "Internal storage error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request refused");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
