//! Error types for toolchest-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the manifest store.
///
/// Any of these is fatal for an installation run: without a trustworthy
/// manifest the orchestrator cannot tell what is already installed.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The backing file exists but could not be read.
    #[error("manifest at {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file was read but its contents are not a valid manifest.
    #[error("manifest at {path} is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// A record could not be durably written.
    #[error("failed to write manifest at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking I/O task on the manifest was cancelled or panicked.
    #[error("manifest I/O on {path} did not finish: {detail}")]
    Interrupted { path: PathBuf, detail: String },
}

impl ManifestError {
    /// Path of the backing store involved in the failure.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ManifestError::Unreadable { path, .. }
            | ManifestError::Corrupt { path, .. }
            | ManifestError::Write { path, .. }
            | ManifestError::Interrupted { path, .. } => path,
        }
    }
}
