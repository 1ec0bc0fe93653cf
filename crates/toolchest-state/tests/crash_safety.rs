//! Crash-safety of the file-backed manifest.
//!
//! A "crash" is modelled by dropping the store handle without any shutdown
//! step and opening a new one on the same path.

use std::fs;

use toolchest_state::{FileManifestStore, InstallMethod, InstallationRecord, ManifestStore};

#[tokio::test]
async fn record_written_before_crash_survives_and_later_one_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");

    {
        let store = FileManifestStore::new(&path);
        store
            .put(InstallationRecord::installed("a", "1.0.0", InstallMethod::SourceBuild))
            .await
            .unwrap();
        // Process dies here, before tool "b" is installed.
    }

    let restarted = FileManifestStore::open(&path).unwrap();
    let all = restarted.get_all().await.unwrap();
    assert!(all["a"].is_installed());
    assert!(!all.contains_key("b"));
}

#[tokio::test]
async fn interrupted_temp_write_does_not_corrupt_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");

    let store = FileManifestStore::new(&path);
    store
        .put(InstallationRecord::installed("a", "1.0.0", InstallMethod::SourceBuild))
        .await
        .unwrap();
    drop(store);

    // Leftover of a write that died before its rename.
    fs::write(dir.path().join(".tmpXYZ123"), br#"{"format_version": 1, "tools": {"b": "#).unwrap();

    let restarted = FileManifestStore::open(&path).unwrap();
    let all = restarted.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all.contains_key("a"));
}

#[tokio::test]
async fn file_on_disk_is_always_a_complete_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let store = FileManifestStore::new(&path);

    for i in 0..10 {
        store
            .put(InstallationRecord::installed(
                format!("t{i}"),
                "1",
                InstallMethod::PackageManager,
            ))
            .await
            .unwrap();

        let raw = fs::read(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc["format_version"], 1);
        assert_eq!(doc["tools"].as_object().unwrap().len(), i + 1);
    }
}
