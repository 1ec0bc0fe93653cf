//! Filesystem layout for a toolchest installation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const HOME_ENV: &str = "TOOLCHEST_HOME";
pub const CATALOG_ENV: &str = "TOOLCHEST_CATALOG";
pub const MANIFEST_ENV: &str = "TOOLCHEST_MANIFEST";
pub const INSTALL_DIR_ENV: &str = "TOOLCHEST_INSTALL_DIR";

/// Where the catalog, manifest, binaries, and build trees live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchestConfig {
    pub catalog_path: PathBuf,
    pub manifest_path: PathBuf,
    pub install_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl Default for ToolchestConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ToolchestConfig {
    /// Everything under one root:
    /// `catalog.json`, `manifest.json`, `bin/`, `build/`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            catalog_path: root.join("catalog.json"),
            manifest_path: root.join("manifest.json"),
            install_dir: root.join("bin"),
            work_dir: root.join("build"),
        }
    }

    /// Layout from `TOOLCHEST_HOME` (default `$HOME/.toolchest`), with
    /// `TOOLCHEST_CATALOG`, `TOOLCHEST_MANIFEST`, and
    /// `TOOLCHEST_INSTALL_DIR` overriding individual paths.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key).map(PathBuf::from))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let root = lookup(HOME_ENV).unwrap_or_else(|| {
            lookup("HOME")
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".toolchest")
        });
        let mut config = Self::with_root(root);
        if let Some(path) = lookup(CATALOG_ENV) {
            config.catalog_path = path;
        }
        if let Some(path) = lookup(MANIFEST_ENV) {
            config.manifest_path = path;
        }
        if let Some(path) = lookup(INSTALL_DIR_ENV) {
            config.install_dir = path;
        }
        config
    }
}
