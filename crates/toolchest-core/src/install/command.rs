//! External command execution shared by every install method.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

use super::{tail, InstallContext, InstallError, DIAGNOSTIC_TAIL_BYTES};

/// Result of one command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    /// Exit code, or `None` when the process died from a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined output, trimmed to the last [`DIAGNOSTIC_TAIL_BYTES`].
    pub fn diagnostic(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(self.stdout.trim_end());
        if !self.stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(self.stderr.trim_end());
        }
        tail(&text, DIAGNOSTIC_TAIL_BYTES).to_string()
    }
}

/// Runs install commands with captured output.
///
/// The child is killed if the run is cancelled or if the future driving it
/// is dropped (e.g. by an install timeout).
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    env: Vec<(String, String)>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable to every command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run `argv` to completion and return its output, whatever the exit
    /// status.
    pub async fn run(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        ctx: &InstallContext,
    ) -> Result<CommandOutput, InstallError> {
        let (exe, args) = argv.split_first().ok_or(InstallError::EmptyCommand)?;
        let command = argv.join(" ");
        let start = Instant::now();

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("TOOLCHEST_INSTALL_DIR", &ctx.install_dir)
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| InstallError::Spawn {
            command: command.clone(),
            source,
        })?;

        let mut cancel = ctx.cancel.clone();
        let output = tokio::select! {
            out = child.wait_with_output() => out?,
            _ = cancel.cancelled() => {
                debug!(command = %command, "command killed on cancellation");
                return Err(InstallError::Cancelled);
            }
        };

        Ok(CommandOutput {
            command,
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Like [`CommandRunner::run`] but a non-zero exit becomes
    /// [`InstallError::CommandFailed`].
    pub async fn run_checked(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        ctx: &InstallContext,
    ) -> Result<CommandOutput, InstallError> {
        let output = self.run(argv, cwd, ctx).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(InstallError::CommandFailed {
                command: output.command.clone(),
                code: output.exit_code,
                output: output.diagnostic(),
            })
        }
    }
}
