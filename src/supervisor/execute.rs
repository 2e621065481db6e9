// src/supervisor/execute.rs

//! Synchronous run of the runtime over the current artifacts, with output
//! captured instead of streamed. Independent of the supervised process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::RuntimeSpec;

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteReport {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecuteReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("no compiled artifacts available yet")]
    NoArtifacts,

    #[error("could not start `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("`{program}` did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },
}

pub async fn run_to_completion(
    spec: &RuntimeSpec,
    artifacts: &[PathBuf],
) -> Result<ExecuteReport, ExecuteError> {
    if artifacts.is_empty() {
        return Err(ExecuteError::NoArtifacts);
    }

    let mut cmd = spec.command(artifacts);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| ExecuteError::Spawn {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;

    let output = match tokio::time::timeout(spec.execute_timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ExecuteError::Spawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            warn!(program = %spec.program, timeout = ?spec.execute_timeout, "execute timed out");
            return Err(ExecuteError::TimedOut {
                program: spec.program.clone(),
                after: spec.execute_timeout,
            });
        }
    };

    let report = ExecuteReport {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    info!(program = %spec.program, code = ?report.code, "execute finished");
    Ok(report)
}
