//! Persisted installation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a tool got onto the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Built from source with the tool's build steps.
    SourceBuild,
    /// Downloaded as a ready-to-run binary.
    PrebuiltBinary,
    /// Delegated to a system or language package manager.
    PackageManager,
}

impl std::fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstallMethod::SourceBuild => "source-build",
            InstallMethod::PrebuiltBinary => "prebuilt-binary",
            InstallMethod::PackageManager => "package-manager",
        };
        f.write_str(s)
    }
}

/// Terminal outcome stored for a tool. In-flight states never reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Installed,
    Failed,
    Skipped,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordStatus::Installed => "installed",
            RecordStatus::Failed => "failed",
            RecordStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One manifest entry.
///
/// `tool_id` may name a tool that is no longer in the catalog; readers must
/// tolerate such historical entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub tool_id: String,
    /// Version that ended up installed, or the targeted version for
    /// failed/skipped entries.
    pub installed_version: String,
    pub method: InstallMethod,
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub status: RecordStatus,
    /// Captured diagnostic text (failure output, or the reason for a skip).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl InstallationRecord {
    /// A successful install.
    pub fn installed(
        tool_id: impl Into<String>,
        version: impl Into<String>,
        method: InstallMethod,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            installed_version: version.into(),
            method,
            installed_at: Utc::now(),
            checksum: None,
            status: RecordStatus::Installed,
            diagnostic: None,
        }
    }

    /// A failed install with the operation's diagnostic output.
    pub fn failed(
        tool_id: impl Into<String>,
        version: impl Into<String>,
        method: InstallMethod,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            status: RecordStatus::Failed,
            diagnostic: Some(diagnostic.into()),
            ..Self::installed(tool_id, version, method)
        }
    }

    /// An install that was never attempted.
    pub fn skipped(
        tool_id: impl Into<String>,
        version: impl Into<String>,
        method: InstallMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: RecordStatus::Skipped,
            diagnostic: Some(reason.into()),
            ..Self::installed(tool_id, version, method)
        }
    }

    /// Attach a checksum of the installed artifact.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Attach diagnostic text (e.g. build output kept for a successful install).
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn is_installed(&self) -> bool {
        self.status == RecordStatus::Installed
    }

    pub fn is_failed(&self) -> bool {
        self.status == RecordStatus::Failed
    }
}
