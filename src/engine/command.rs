//! Synthesis through an external engine program.
//!
//! The program is called as
//! `<program> <args..> --text T --speaker-wav P --language L --temperature X --speed S --output O`
//! and must write a WAV file to `O` and exit 0.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::process::{self, ProcessError};
use crate::engine::{EngineError, EngineResult, SynthesisEngine, SynthesisRequest};

#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn arguments(&self, request: &SynthesisRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--text".to_string(),
            request.text.clone(),
            "--speaker-wav".to_string(),
            request.speaker_wav.display().to_string(),
            "--language".to_string(),
            request.language.clone(),
            "--temperature".to_string(),
            request.temperature.to_string(),
            "--speed".to_string(),
            request.speed.to_string(),
            "--output".to_string(),
            request.output_path.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl SynthesisEngine for CommandEngine {
    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<PathBuf> {
        let output = process::run(&self.program, &self.arguments(request), self.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { timeout_secs, .. } => EngineError::Timeout(timeout_secs),
                other => EngineError::Spawn(other.to_string()),
            })?;

        if !output.success {
            return Err(EngineError::Failed(output.stderr_tail().to_string()));
        }

        if !tokio::fs::try_exists(&request.output_path).await.unwrap_or(false) {
            return Err(EngineError::MissingOutput(request.output_path.clone()));
        }

        Ok(request.output_path.clone())
    }
}
