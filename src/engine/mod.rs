//! Boundary to the speech-synthesis engine and audio tooling.
//!
//! # Data Flow
//! ```text
//! route handler
//!     → AudioToolkit (convert reference clip to WAV, read duration)
//!     → JobQueue::acquire (wait for a free engine slot)
//!     → SynthesisEngine::synthesize (text + reference WAV → output WAV)
//! ```
//!
//! # Design Decisions
//! - The engine and toolkit are traits; the shipped adapters run external programs
//! - Every external program runs without a shell and under a timeout

pub mod audio;
pub mod command;
pub mod process;
pub mod queue;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use audio::FfmpegToolkit;
pub use command::CommandEngine;
pub use queue::{JobPermit, JobQueue};

/// Parameters of one synthesis job.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_wav: PathBuf,
    pub language: String,
    pub temperature: f32,
    pub speed: f32,
    pub output_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start synthesis engine: {0}")]
    Spawn(String),

    #[error("synthesis timed out after {0} seconds")]
    Timeout(u64),

    #[error("synthesis failed: {0}")]
    Failed(String),

    #[error("synthesis produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("job queue closed")]
    QueueClosed,
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio conversion failed: {0}")]
    Conversion(String),

    #[error("could not read audio duration: {0}")]
    Duration(String),
}

/// Text plus reference audio in, audio file out.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<PathBuf>;
}

/// Audio format conversion and inspection.
#[async_trait]
pub trait AudioToolkit: Send + Sync {
    async fn convert_to_wav(&self, input: &Path, output: &Path) -> Result<(), AudioError>;

    async fn duration_secs(&self, path: &Path) -> Result<f64, AudioError>;
}
