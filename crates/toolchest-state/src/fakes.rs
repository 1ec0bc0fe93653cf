//! In-memory fakes for the manifest store (testing only)
//!
//! `MemoryManifestStore` satisfies the [`ManifestStore`] contract without
//! touching disk, records the order of writes, and can be switched into a
//! corrupt state to exercise fatal-manifest handling.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::ManifestError;
use crate::record::InstallationRecord;
use crate::store::{ManifestResult, ManifestSnapshot, ManifestStore};

/// In-memory manifest backed by a `BTreeMap<tool_id, record>`.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    records: Mutex<ManifestSnapshot>,
    writes: Mutex<Vec<String>>,
    corrupt: AtomicBool,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records.
    pub fn with_records(records: impl IntoIterator<Item = InstallationRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.lock().unwrap_or_else(PoisonError::into_inner);
            for rec in records {
                map.insert(rec.tool_id.clone(), rec);
            }
        }
        store
    }

    /// Make every subsequent read fail with [`ManifestError::Corrupt`].
    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    /// Tool ids in the order `put` was called.
    pub fn write_log(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_readable(&self) -> ManifestResult<()> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(ManifestError::Corrupt {
                path: PathBuf::from("<memory>"),
                detail: "store marked corrupt".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn get(&self, tool_id: &str) -> ManifestResult<Option<InstallationRecord>> {
        self.check_readable()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(tool_id).cloned())
    }

    async fn get_all(&self) -> ManifestResult<ManifestSnapshot> {
        self.check_readable()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.clone())
    }

    async fn put(&self, record: InstallationRecord) -> ManifestResult<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.tool_id.clone());
        records.insert(record.tool_id.clone(), record);
        Ok(())
    }

    async fn reload(&self) -> ManifestResult<ManifestSnapshot> {
        self.get_all().await
    }
}
