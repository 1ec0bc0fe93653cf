//! Manifest store contract
//!
//! The store is the only resource mutated by multiple installation workers.
//! Every mutation goes through [`ManifestStore::put`]; implementations
//! serialize writers internally so each `put` is all-or-nothing.
//!
//! In-memory fakes live in the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::ManifestError;
use crate::record::InstallationRecord;

/// Result type for manifest operations
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Full view of the manifest keyed by tool id.
pub type ManifestSnapshot = BTreeMap<String, InstallationRecord>;

/// Durable record of installation outcomes.
///
/// Guarantees:
/// - `put` atomically replaces any prior entry for the same tool id.
/// - A crash between two `put` calls leaves the first fully recorded and the
///   second absent; a half-written record is never observable.
/// - `reload` discards cached state and re-reads the backing store.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Look up the record for `tool_id`.
    async fn get(&self, tool_id: &str) -> ManifestResult<Option<InstallationRecord>>;

    /// Return every record.
    async fn get_all(&self) -> ManifestResult<ManifestSnapshot>;

    /// Persist one record, replacing the previous entry for its tool id.
    async fn put(&self, record: InstallationRecord) -> ManifestResult<()>;

    /// Drop the cache and re-read the durable state.
    async fn reload(&self) -> ManifestResult<ManifestSnapshot>;
}
