//! Command execution capability used by cleanup.
//!
//! Cleanup only needs "run this program with these args in this directory and
//! tell me what happened". [`CommandExecutor`] is that seam; [`ProcessExecutor`]
//! is the local `tokio::process` implementation and
//! [`crate::testing::MockExecutor`] the scripted one used in tests.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A command invocation that did not succeed, captured as a value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandFailure {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} exited with {}: {}", exit_label(.code), .stderr.trim())]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{program} timed out after {}", timeout_label(.timeout))]
    TimedOut { program: String, timeout: Duration },
}

fn timeout_label(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Runs external programs on behalf of the cleanup executor.
///
/// Failures are returned as [`CommandFailure`] values and must never panic or
/// abort the caller.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> impl Future<Output = Result<CommandOutput, CommandFailure>> + Send;
}

impl<E: CommandExecutor> CommandExecutor for &E {
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> impl Future<Output = Result<CommandOutput, CommandFailure>> + Send {
        (**self).execute(program, args, cwd)
    }
}

/// Spawns local processes with `tokio::process`.
///
/// No timeout is applied unless one is configured; a hung process then blocks
/// the caller, which is the expected behavior for destructive git commands.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child and report [`CommandFailure::TimedOut`] after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<CommandOutput, CommandFailure> {
        debug!(program, ?args, cwd = %cwd.display(), "Spawning command");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(CommandFailure::TimedOut {
                        program: program.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => command.output().await,
        };

        let output = result.map_err(|err| CommandFailure::Spawn {
            program: program.to_string(),
            message: err.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: output.status.code().unwrap_or(0),
            })
        } else {
            Err(CommandFailure::NonZeroExit {
                program: program.to_string(),
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}
