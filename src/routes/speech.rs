//! One-shot synthesis endpoints.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;
use crate::routes::{
    synthesize_to_response, ScratchFile, UploadForm, DEFAULT_LANGUAGE, DEFAULT_SPEED,
    DEFAULT_TEMPERATURE,
};

/// `POST /tts`: the engine only clones, so plain TTS is refused.
pub async fn text_to_speech(body: Bytes) -> Response {
    let language = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("language")?.as_str().map(String::from))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "A reference voice is required. Use /clone or /voices/{voice_id}/use",
            "language": language,
        })),
    )
        .into_response()
}

/// `POST /clone`: synthesize with an uploaded reference clip.
pub async fn clone_voice(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = UploadForm::read(multipart).await?;
    let audio = form
        .audio
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("No audio file"))?;
    let text = form
        .text("text")
        .ok_or_else(|| ApiError::bad_request("No text provided"))?
        .to_string();
    let language = form.text("language").unwrap_or(DEFAULT_LANGUAGE).to_string();
    let temperature = form.number("temperature", DEFAULT_TEMPERATURE)?;
    let speed = form.number("speed", DEFAULT_SPEED)?;

    let storage = &state.config.storage;
    let extension = audio.extension();
    let upload = ScratchFile::new(
        storage
            .temp_dir
            .join(format!("input_{}{}", uuid::Uuid::new_v4(), extension)),
    );
    tokio::fs::write(upload.path(), &audio.data).await?;

    let speaker = if extension == ".wav" {
        upload
    } else {
        let converted = ScratchFile::new(
            storage
                .temp_dir
                .join(format!("converted_{}.wav", uuid::Uuid::new_v4())),
        );
        state.audio.convert_to_wav(upload.path(), converted.path()).await?;
        converted
    };

    let duration = match state.audio.duration_secs(speaker.path()).await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read reference clip duration");
            0.0
        }
    };
    let minimum = state.config.engine.min_reference_secs;
    if duration < minimum {
        return Err(ApiError::bad_request(format!(
            "Reference audio too short ({:.1}s). Use at least {} seconds",
            duration,
            minimum.ceil()
        )));
    }

    synthesize_to_response(
        &state,
        text,
        speaker.path().to_path_buf(),
        language,
        temperature,
        speed,
    )
    .await
}
