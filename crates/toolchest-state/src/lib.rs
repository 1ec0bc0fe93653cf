//! Toolchest-State: durable installation manifest
//!
//! This crate is the single source of truth for "is X installed, with what
//! version, by what method, when". Nothing else in toolchest writes the
//! manifest file.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: crash safety and single-writer discipline.
//!
//! ## Key Components
//!
//! - `InstallationRecord`: one terminal outcome per tool
//! - `ManifestStore`: async get/put/reload contract
//! - `FileManifestStore`: JSON snapshot file, atomic temp-file-plus-rename writes
//! - `fakes::MemoryManifestStore`: in-memory store for tests

mod error;
pub mod fakes;
mod file_store;
mod record;
pub mod store;

pub use error::ManifestError;
pub use file_store::{FileManifestStore, MANIFEST_FORMAT_VERSION};
pub use record::{InstallMethod, InstallationRecord, RecordStatus};
pub use store::{ManifestResult, ManifestSnapshot, ManifestStore};
