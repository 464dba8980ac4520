//! Route handlers behind the security pipeline.
//!
//! # Routes
//! - `POST /tts` (speech.rs): refuses, a reference voice is required
//! - `POST /clone` (speech.rs): one-shot cloning from an uploaded clip
//! - `GET|POST /voices`, `DELETE /voices/{id}`, `POST /voices/{id}/use` (voices.rs)
//! - `GET /queue/status`, `GET /health` (status.rs)

pub mod speech;
pub mod status;
pub mod voices;

use axum::{
    body::Bytes,
    extract::Multipart,
    http::header,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::engine::SynthesisRequest;
use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;

pub const DEFAULT_LANGUAGE: &str = "es";
pub const DEFAULT_TEMPERATURE: f32 = 0.75;
pub const DEFAULT_SPEED: f32 = 1.0;

/// A file that is deleted when dropped.
#[derive(Debug)]
pub(crate) struct ScratchFile(PathBuf);

impl ScratchFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %e, "Could not remove scratch file");
            }
        }
    }
}

/// Uploaded audio part of a multipart form.
#[derive(Debug)]
pub(crate) struct UploadedAudio {
    pub file_name: String,
    pub data: Bytes,
}

impl UploadedAudio {
    /// Extension including the dot, lowercased, or empty.
    pub(crate) fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub audio: Option<UploadedAudio>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub(crate) async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(String::from) else {
                continue;
            };
            if name == "audio" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid audio upload: {}", e)))?;
                form.audio = Some(UploadedAudio { file_name, data });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid field '{}': {}", name, e)))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub(crate) fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub(crate) fn number(&self, name: &str, default: f32) -> ApiResult<f32> {
        match self.text(name) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid {}", name))),
        }
    }
}

/// Run a synthesis job through the queue and answer with the WAV bytes.
pub(crate) async fn synthesize_to_response(
    state: &AppState,
    text: String,
    speaker_wav: PathBuf,
    language: String,
    temperature: f32,
    speed: f32,
) -> ApiResult<Response> {
    let output = ScratchFile::new(
        state
            .config
            .storage
            .output_dir
            .join(format!("{}.wav", uuid::Uuid::new_v4())),
    );
    let request = SynthesisRequest {
        text,
        speaker_wav,
        language,
        temperature,
        speed,
        output_path: output.path().to_path_buf(),
    };

    let path = state.jobs.synthesize(state.engine.as_ref(), &request).await?;
    let audio = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], audio).into_response())
}
