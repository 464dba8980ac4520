//! Audio conversion and duration lookup through ffmpeg / ffprobe.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::process;
use crate::engine::{AudioError, AudioToolkit};

const TOOL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegToolkit {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_program.clone(),
            ffprobe: config.ffprobe_program.clone(),
        }
    }
}

#[async_trait]
impl AudioToolkit for FfmpegToolkit {
    async fn convert_to_wav(&self, input: &Path, output: &Path) -> Result<(), AudioError> {
        let args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-ac".to_string(),
            "1".to_string(),
            output.display().to_string(),
        ];

        let out = process::run(&self.ffmpeg, &args, TOOL_TIMEOUT)
            .await
            .map_err(|e| AudioError::Conversion(e.to_string()))?;
        if !out.success {
            return Err(AudioError::Conversion(out.stderr_tail().to_string()));
        }
        Ok(())
    }

    async fn duration_secs(&self, path: &Path) -> Result<f64, AudioError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.display().to_string(),
        ];

        let out = process::run(&self.ffprobe, &args, TOOL_TIMEOUT)
            .await
            .map_err(|e| AudioError::Duration(e.to_string()))?;
        if !out.success {
            return Err(AudioError::Duration(out.stderr_tail().to_string()));
        }
        parse_duration(&out.stdout)
    }
}

fn parse_duration(stdout: &str) -> Result<f64, AudioError> {
    let value = stdout.trim();
    value
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AudioError::Duration(format!("unexpected ffprobe output '{}'", value)))
}
