//! Install methods: the external operation that puts one tool on disk.
//!
//! The orchestrator only sees the [`Installer`] trait. [`MethodInstaller`]
//! is the production implementation and dispatches on the catalog entry's
//! [`InstallRef`](crate::catalog::InstallRef); tests substitute scripted
//! fakes.

mod command;
mod dispatch;
mod package_manager;
mod prebuilt;
mod source_build;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use toolchest_state::InstallMethod;

use crate::cancel::CancelToken;
use crate::catalog::ToolConfig;
use crate::health::probe::{BinaryProbe, ProbeOutcome};
use crate::options::InstallationOptions;

pub use command::{CommandOutput, CommandRunner};
pub use dispatch::MethodInstaller;
pub use package_manager::PackageManagerInstaller;
pub use prebuilt::PrebuiltInstaller;
pub use source_build::SourceBuildInstaller;

/// Most diagnostic text kept from a single command.
pub const DIAGNOSTIC_TAIL_BYTES: usize = 4096;

/// Where an install runs and how it can be interrupted.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub run_id: String,
    /// Directory prebuilt binaries land in; exported to build steps.
    pub install_dir: PathBuf,
    /// Parent of per-tool build directories.
    pub work_dir: PathBuf,
    pub cancel: CancelToken,
}

impl InstallContext {
    pub fn new(install_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: String::new(),
            install_dir: install_dir.into(),
            work_dir: work_dir.into(),
            cancel: CancelToken::never(),
        }
    }

    /// Scratch directory for `tool`.
    pub fn tool_work_dir(&self, tool: &ToolConfig) -> PathBuf {
        self.work_dir.join(&tool.id)
    }
}

/// Successful install as reported by an install method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: String,
    pub method: InstallMethod,
    pub checksum: Option<String>,
    /// Output worth keeping even on success (tail of the last command).
    pub diagnostic: String,
}

impl InstallOutcome {
    pub fn new(version: impl Into<String>, method: InstallMethod) -> Self {
        Self {
            version: version.into(),
            method,
            checksum: None,
            diagnostic: String::new(),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = diagnostic.into();
        self
    }
}

/// Per-tool install failure. Rendered to text and stored in the tool's
/// `Failed` record; never aborts the run.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("`{command}` exited with {}:\n{output}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("install timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("install cancelled")]
    Cancelled,

    #[error("download of {url} failed: {detail}")]
    Download { url: String, detail: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("install method has nothing to run")]
    EmptyCommand,

    #[error("install panicked: {0}")]
    Panicked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability interface for the external install operation.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install `tool`. May run for minutes; must return rather than hang
    /// when `ctx.cancel` fires.
    async fn install(
        &self,
        tool: &ToolConfig,
        options: &InstallationOptions,
        ctx: &InstallContext,
    ) -> Result<InstallOutcome, InstallError>;
}

/// Hex SHA-256 of a file's contents.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(sha256_hex(&bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Keep at most the last `max` bytes of `text`, cut on a char boundary.
pub(crate) fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Build the success outcome after a method finished: probe the binary for
/// its version (falling back to the catalog's) and checksum it.
pub(crate) async fn finish_install(
    tool: &ToolConfig,
    probe: &dyn BinaryProbe,
    method: InstallMethod,
    diagnostic: String,
) -> InstallOutcome {
    let mut outcome = InstallOutcome::new(tool.version.clone(), method).with_diagnostic(diagnostic);
    if let ProbeOutcome::Found { path, version } = probe.probe(tool).await {
        if let Some(version) = version {
            outcome.version = version;
        }
        match sha256_file(&path).await {
            Ok(sum) => outcome.checksum = Some(sum),
            Err(e) => tracing::debug!(tool_id = %tool.id, error = %e, "could not checksum binary"),
        }
    }
    outcome
}
