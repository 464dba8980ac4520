//! Running external programs.
//!
//! No shell is involved: arguments go straight to the program. Output is
//! captured, and a child that outlives its timeout is killed.

use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Captured result of a finished program.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Last non-empty stderr line, for error messages.
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no error output")
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },
}

pub async fn run(program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput, ProcessError> {
    tracing::debug!(
        program = %program,
        args = ?args,
        timeout_secs = timeout.as_secs(),
        "Executing subprocess"
    );

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::Spawn {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    let start = Instant::now();
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProcessError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })
        }
        Err(_) => {
            // Dropping the wait future drops the child, which kills it.
            tracing::warn!(program = %program, timeout_secs = timeout.as_secs(), "Process timed out, killed");
            return Err(ProcessError::Timeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let result = ProcessOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!(
        success = result.success,
        exit_code = ?result.exit_code,
        duration_ms = start.elapsed().as_millis() as u64,
        "Subprocess completed"
    );
    Ok(result)
}
