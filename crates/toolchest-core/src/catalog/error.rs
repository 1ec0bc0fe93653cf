//! Catalog validation and lookup errors.

use thiserror::Error;

/// Errors produced while loading, validating, or expanding the catalog.
///
/// All of these are detected before any install is attempted and are never
/// retried.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A tool lists a dependency that is not in the catalog.
    #[error("tool '{tool}' depends on unknown tool '{dependency}'")]
    UnknownDependency { tool: String, dependency: String },

    /// The dependency relation contains a cycle. `path` starts and ends with
    /// the same tool id.
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// Two tools share an id.
    #[error("duplicate tool id '{id}'")]
    DuplicateTool { id: String },

    /// Two bundles share an id, or a bundle id collides with a tool id.
    #[error("duplicate bundle id '{id}'")]
    DuplicateBundle { id: String },

    /// A requested id names neither a tool nor a bundle.
    #[error("unknown tool or bundle '{id}'")]
    UnknownTool { id: String },

    /// A bundle lists a tool that is not in the catalog.
    #[error("bundle '{bundle}' lists unknown tool '{tool}'")]
    UnknownBundleMember { bundle: String, tool: String },

    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
