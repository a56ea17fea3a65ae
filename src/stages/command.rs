//! External command execution used by the integration executors.
//!
//! The [`CommandRunner`] seam keeps process spawning out of executor logic so
//! tests can script exit codes and output.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

#[derive(Debug, Error, Clone)]
pub enum CommandError {
    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },
    #[error("Command not found: {command}")]
    CommandNotFound { command: String },
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Command cancelled")]
    Cancelled,
}

/// A fully described process invocation.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Vec<u8>,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, CommandError>;
}

/// Real implementation on top of `tokio::process`.
pub struct ProcessCommandRunner;

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, CommandError> {
        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::CommandNotFound {
                        command: invocation.program.clone(),
                    }
                } else {
                    CommandError::ExecutionFailed {
                        message: e.to_string(),
                    }
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores stdin may close it early; that is not an error.
            if let Err(e) = stdin.write_all(&invocation.stdin).await {
                tracing::debug!(error = %e, "Command closed stdin early");
            }
        }

        let output = tokio::select! {
            _ = invocation.cancel.cancelled() => return Err(CommandError::Cancelled),
            waited = tokio::time::timeout(invocation.timeout, child.wait_with_output()) => waited
                .map_err(|_| CommandError::Timeout {
                    timeout_ms: invocation.timeout.as_millis() as u64,
                })?
                .map_err(|e| CommandError::ExecutionFailed { message: e.to_string() })?,
        };

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
