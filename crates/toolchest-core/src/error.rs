//! Run-level error type.

use thiserror::Error;
use toolchest_state::ManifestError;

use crate::catalog::CatalogError;

/// Errors that abort a whole run.
///
/// Per-tool install failures never show up here; they are contained in the
/// plan and reported through [`crate::InstallSummary`].
#[derive(Debug, Error)]
pub enum ToolchestError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The manifest could not be read or written; installed state is unknown.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("invalid installation options: {0}")]
    InvalidOptions(String),
}

/// Convenience result alias.
pub type ToolchestResult<T> = std::result::Result<T, ToolchestError>;
