//! Operational endpoints. Both are exempt from every gate.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::json;

use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub status: &'static str,
    pub redis_available: bool,
    pub jobs_queued: usize,
    pub jobs_processing: usize,
    pub rate_limit_users: usize,
    pub timestamp: u64,
}

/// `GET /queue/status`
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(QueueStatus {
        status: "operational",
        redis_available: state.stores.has_shared(),
        jobs_queued: state.jobs.waiting(),
        jobs_processing: state.jobs.running(),
        rate_limit_users: state.pipeline.rate_limiter().active_identifiers().await,
        timestamp: state.clock.now(),
    })
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "tts-voice-cloning",
    }))
}
