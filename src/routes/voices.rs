//! Voice gallery endpoints.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;
use crate::routes::{
    synthesize_to_response, ScratchFile, UploadForm, DEFAULT_LANGUAGE, DEFAULT_SPEED,
    DEFAULT_TEMPERATURE,
};
use crate::voices::{VoiceRecord, KIND_USER};

/// `GET /voices`
pub async fn list_voices(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let (preloaded, user): (Vec<VoiceRecord>, Vec<VoiceRecord>) = state
        .catalog
        .list()
        .await?
        .into_iter()
        .partition(VoiceRecord::is_preloaded);

    Ok(Json(json!({
        "preloaded_voices": preloaded,
        "user_voices": user,
    })))
}

/// `POST /voices`: store an uploaded clip in the gallery.
pub async fn save_voice(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = UploadForm::read(multipart).await?;
    let audio = form
        .audio
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("No audio file"))?;

    let storage = &state.config.storage;
    let id = uuid::Uuid::new_v4().to_string();
    let filename = format!("{}.wav", id);
    let upload = ScratchFile::new(
        storage
            .temp_dir
            .join(format!("temp_{}{}", id, audio.extension())),
    );
    tokio::fs::write(upload.path(), &audio.data).await?;

    let final_path = storage.voices_dir.join(&filename);
    state.audio.convert_to_wav(upload.path(), &final_path).await?;

    let duration = match state.audio.duration_secs(&final_path).await {
        Ok(d) => (d * 100.0).round() / 100.0,
        Err(e) => {
            tracing::warn!(voice = %id, error = %e, "Could not read saved voice duration");
            0.0
        }
    };

    let record = VoiceRecord {
        id,
        name: form.text("name").unwrap_or("Untitled").to_string(),
        description: form.fields.get("description").cloned().unwrap_or_default(),
        language: form.text("language").unwrap_or(DEFAULT_LANGUAGE).to_string(),
        filename,
        duration,
        kind: KIND_USER.to_string(),
        created_at: state.clock.now().to_string(),
        extra: Default::default(),
    };
    state.catalog.insert(record.clone()).await?;
    tracing::info!(voice = %record.id, name = %record.name, "Voice saved to gallery");

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// `DELETE /voices/{id}`
pub async fn delete_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let voice = state
        .catalog
        .remove(&id)
        .await?
        .ok_or(ApiError::NotFound("Voice not found"))?;

    let file = state.config.storage.voices_dir.join(&voice.filename);
    match tokio::fs::remove_file(&file).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(voice = %id, error = %e, "Could not remove voice file"),
    }
    tracing::info!(voice = %id, "Voice deleted");

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
struct UseVoiceBody {
    text: Option<String>,
    language: Option<String>,
    temperature: Option<f32>,
    speed: Option<f32>,
}

/// `POST /voices/{id}/use`: synthesize with a gallery voice.
pub async fn use_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let voice = state
        .catalog
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound("Voice not found"))?;

    let body: UseVoiceBody = if body.is_empty() {
        UseVoiceBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid JSON body"))?
    };
    let text = body
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No text provided"))?;

    let speaker = state.config.storage.voices_dir.join(&voice.filename);
    if !tokio::fs::try_exists(&speaker).await.unwrap_or(false) {
        return Err(ApiError::NotFound("Voice file not found"));
    }

    synthesize_to_response(
        &state,
        text,
        speaker,
        body.language.unwrap_or(voice.language),
        body.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        body.speed.unwrap_or(DEFAULT_SPEED),
    )
    .await
}
