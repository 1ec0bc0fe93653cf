use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ManifestError;
use crate::record::InstallationRecord;
use crate::store::{ManifestResult, ManifestSnapshot, ManifestStore};

/// On-disk schema version written into every snapshot.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentRef<'a> {
    format_version: u32,
    tools: &'a ManifestSnapshot,
}

#[derive(Deserialize)]
struct Document {
    format_version: u32,
    #[serde(default)]
    tools: ManifestSnapshot,
}

/// JSON-file manifest with atomic whole-snapshot writes.
///
/// Layout: a single `{ "format_version": 1, "tools": { <id>: <record> } }`
/// document. Each `put` takes an exclusive advisory lock on the sidecar
/// `<manifest>.lock`, re-reads the file, merges the record, writes the
/// result to a temp file in the same directory, fsyncs it, then renames it
/// over the previous file. A crash leaves either the old or the new snapshot,
/// and records written by other processes are never dropped.
///
/// A missing file is an empty manifest. File I/O runs on the blocking pool.
pub struct FileManifestStore {
    path: PathBuf,
    cache: Mutex<Option<ManifestSnapshot>>,
}

impl FileManifestStore {
    /// Open the manifest at `path`. Nothing is read until first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Open the manifest at `path` and read it eagerly, surfacing corruption
    /// up front.
    pub fn open(path: impl Into<PathBuf>) -> ManifestResult<Self> {
        let path = path.into();
        let snapshot = read_snapshot(&path)?;
        Ok(Self {
            path,
            cache: Mutex::new(Some(snapshot)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file holding the cross-process write lock.
    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }

    async fn read_from_disk(&self) -> ManifestResult<ManifestSnapshot> {
        let path = self.path.clone();
        blocking(&self.path, move || read_snapshot(&path)).await
    }

    /// Run `f` against the cached snapshot, loading it on first use.
    async fn with_cache<T>(&self, f: impl FnOnce(&ManifestSnapshot) -> T) -> ManifestResult<T> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_from_disk().await?);
        }
        Ok(f(cache.get_or_insert_with(ManifestSnapshot::new)))
    }
}

#[async_trait]
impl ManifestStore for FileManifestStore {
    async fn get(&self, tool_id: &str) -> ManifestResult<Option<InstallationRecord>> {
        self.with_cache(|snapshot| snapshot.get(tool_id).cloned()).await
    }

    async fn get_all(&self) -> ManifestResult<ManifestSnapshot> {
        self.with_cache(ManifestSnapshot::clone).await
    }

    async fn put(&self, record: InstallationRecord) -> ManifestResult<()> {
        // In-process writers queue on the cache mutex, other processes on
        // the file lock taken inside `merge_record`.
        let mut cache = self.cache.lock().await;
        let tool_id = record.tool_id.clone();
        let status = record.status;
        let path = self.path.clone();

        let merged = blocking(&self.path, move || merge_record(&path, record)).await?;
        *cache = Some(merged);

        debug!(tool_id = %tool_id, status = %status, path = %self.path.display(), "manifest record written");
        Ok(())
    }

    async fn reload(&self) -> ManifestResult<ManifestSnapshot> {
        let mut cache = self.cache.lock().await;
        let snapshot = self.read_from_disk().await?;
        *cache = Some(snapshot.clone());
        debug!(path = %self.path.display(), records = snapshot.len(), "manifest reloaded");
        Ok(snapshot)
    }
}

async fn blocking<T, F>(path: &Path, f: F) -> ManifestResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ManifestResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ManifestError::Interrupted {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Read-merge-write under the exclusive file lock. Returns the snapshot
/// that was written.
fn merge_record(path: &Path, record: InstallationRecord) -> ManifestResult<ManifestSnapshot> {
    let write_err = |source: io::Error| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(parent_dir(path)).map_err(write_err)?;
    let _lock = lock_exclusive(path).map_err(write_err)?;

    let mut snapshot = read_snapshot(path)?;
    snapshot.insert(record.tool_id.clone(), record);
    write_snapshot(path, &snapshot)?;
    Ok(snapshot)
}

/// Held until the returned handle is dropped.
fn lock_exclusive(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path_for(path))?;
    file.lock_exclusive()?;
    Ok(file)
}

fn read_snapshot(path: &Path) -> ManifestResult<ManifestSnapshot> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ManifestSnapshot::new()),
        Err(e) => {
            return Err(ManifestError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let corrupt = |detail: String| ManifestError::Corrupt {
        path: path.to_path_buf(),
        detail,
    };

    let doc: Document = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
    if doc.format_version != MANIFEST_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {} (expected {})",
            doc.format_version, MANIFEST_FORMAT_VERSION
        )));
    }
    if let Some((key, record)) = doc.tools.iter().find(|(key, rec)| **key != rec.tool_id) {
        return Err(corrupt(format!(
            "entry '{}' holds a record for '{}'",
            key, record.tool_id
        )));
    }
    Ok(doc.tools)
}

fn write_snapshot(path: &Path, snapshot: &ManifestSnapshot) -> ManifestResult<()> {
    let write_err = |source: io::Error| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = parent_dir(path);
    let doc = DocumentRef {
        format_version: MANIFEST_FORMAT_VERSION,
        tools: snapshot,
    };
    let body = serde_json::to_vec_pretty(&doc)
        .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&body).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    sync_dir(dir);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Makes the rename itself durable; failure here only weakens durability.
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InstallMethod, RecordStatus};

    fn make_store() -> (tempfile::TempDir, FileManifestStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileManifestStore::new(dir.path().join("state").join("manifest.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn missing_file_is_empty_manifest() {
        let (_dir, store) = make_store();
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(store.get("rg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_roundtrip_creates_parent_dirs() {
        let (_dir, store) = make_store();
        let rec = InstallationRecord::installed("rg", "14.1.0", InstallMethod::PrebuiltBinary);
        store.put(rec.clone()).await.unwrap();

        assert!(store.path().exists());
        assert_eq!(store.get("rg").await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn put_replaces_prior_entry() {
        let (_dir, store) = make_store();
        store
            .put(InstallationRecord::failed("fd", "9.0.0", InstallMethod::SourceBuild, "boom"))
            .await
            .unwrap();
        store
            .put(InstallationRecord::installed("fd", "9.0.0", InstallMethod::SourceBuild))
            .await
            .unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["fd"].status, RecordStatus::Installed);
    }

    #[tokio::test]
    async fn reload_sees_external_writer() {
        let (dir, store) = make_store();
        store
            .put(InstallationRecord::installed("a", "1", InstallMethod::SourceBuild))
            .await
            .unwrap();

        let other = FileManifestStore::new(dir.path().join("state").join("manifest.json"));
        other
            .put(InstallationRecord::installed("b", "1", InstallMethod::SourceBuild))
            .await
            .unwrap();

        // Stale cache until reload.
        assert!(store.get("b").await.unwrap().is_none());
        let snapshot = store.reload().await.unwrap();
        assert!(snapshot.contains_key("a"));
        assert!(snapshot.contains_key("b"));
    }

    #[tokio::test]
    async fn garbage_file_is_corrupt() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        match store.reload().await {
            Err(ManifestError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
        assert!(matches!(store.get("x").await, Err(ManifestError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn unknown_format_version_is_corrupt() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), br#"{"format_version": 99, "tools": {}}"#).unwrap();
        assert!(matches!(
            FileManifestStore::open(store.path()),
            Err(ManifestError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn mismatched_key_is_corrupt() {
        let (_dir, store) = make_store();
        let rec = InstallationRecord::installed("real", "1", InstallMethod::SourceBuild);
        let mut tools = ManifestSnapshot::new();
        tools.insert("alias".to_string(), rec);
        let body = serde_json::to_vec(&DocumentRef {
            format_version: MANIFEST_FORMAT_VERSION,
            tools: &tools,
        })
        .unwrap();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), body).unwrap();

        assert!(matches!(store.reload().await, Err(ManifestError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn directory_in_place_of_file_is_unreadable() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.path()).unwrap();
        assert!(matches!(
            store.reload().await,
            Err(ManifestError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let (_dir, store) = make_store();
        for id in ["a", "b", "c"] {
            store
                .put(InstallationRecord::installed(id, "1", InstallMethod::PackageManager))
                .await
                .unwrap();
        }
        let mut names: Vec<String> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["manifest.json", "manifest.json.lock"]);
    }
}
