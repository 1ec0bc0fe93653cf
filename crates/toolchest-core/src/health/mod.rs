//! Health checks: manifest records vs. live probes vs. catalog expectations.
//!
//! Read-only. A disagreement between the manifest and the disk is drift
//! (`Warning`), not breakage; `Fail` is reserved for a binary that is present
//! but does not run, or a last attempt that failed and left nothing behind.

pub mod probe;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use toolchest_state::{InstallationRecord, ManifestStore, RecordStatus};
use tracing::warn;

use crate::catalog::{CatalogError, ToolCatalog, ToolConfig};
use crate::error::ToolchestResult;
use probe::{versions_match, BinaryProbe, ProbeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Never attempted: no record, no binary.
    Unknown,
    Pass,
    /// Drift between manifest, disk, and catalog.
    Warning,
    /// Attempted and broken.
    Fail,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Pass => "pass",
            HealthStatus::Warning => "warning",
            HealthStatus::Fail => "fail",
        })
    }
}

/// Result of checking one tool.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub tool_id: String,
    pub status: HealthStatus,
    pub detail: String,
    pub expected_version: String,
    pub recorded_version: Option<String>,
    pub live_version: Option<String>,
    pub binary_path: Option<String>,
}

/// Combine a tool's manifest record with a live probe.
pub fn assess(
    tool: &ToolConfig,
    record: Option<&InstallationRecord>,
    probe: &ProbeOutcome,
) -> HealthReport {
    let expected = tool.version.as_str();
    let mut report = HealthReport {
        tool_id: tool.id.clone(),
        status: HealthStatus::Unknown,
        detail: String::new(),
        expected_version: expected.to_string(),
        recorded_version: record
            .filter(|r| r.is_installed())
            .map(|r| r.installed_version.clone()),
        live_version: None,
        binary_path: None,
    };

    let status = record.map(|r| r.status);
    let (status, detail) = match (status, probe) {
        (_, ProbeOutcome::Broken { path, detail }) => {
            report.binary_path = Some(path.display().to_string());
            (HealthStatus::Fail, format!("binary does not run: {detail}"))
        }
        (Some(RecordStatus::Installed), ProbeOutcome::Missing) => (
            HealthStatus::Warning,
            format!("recorded as installed but `{}` not found", tool.binary_name()),
        ),
        (Some(RecordStatus::Failed), ProbeOutcome::Missing) => {
            let why = record
                .and_then(|r| r.diagnostic.as_deref())
                .and_then(|d| d.lines().last())
                .unwrap_or("no diagnostic");
            (HealthStatus::Fail, format!("last install failed: {why}"))
        }
        (_, ProbeOutcome::Missing) => (HealthStatus::Unknown, "not installed".to_string()),
        (status, ProbeOutcome::Found { path, version }) => {
            report.binary_path = Some(path.display().to_string());
            report.live_version = version.clone();
            found_status(tool, status, report.recorded_version.as_deref(), version.as_deref())
        }
    };
    report.status = status;
    report.detail = detail;
    report
}

fn found_status(
    tool: &ToolConfig,
    status: Option<RecordStatus>,
    recorded: Option<&str>,
    live: Option<&str>,
) -> (HealthStatus, String) {
    let expected = tool.version.as_str();
    match status {
        Some(RecordStatus::Installed) => {}
        Some(RecordStatus::Failed) => {
            return (
                HealthStatus::Warning,
                "binary present but the last recorded install failed".to_string(),
            )
        }
        _ => {
            return (
                HealthStatus::Warning,
                "binary present but not installed by toolchest".to_string(),
            )
        }
    }

    // Prefer what the binary says; fall back to the manifest.
    match live.or(recorded) {
        Some(version) if !versions_match(expected, version) => (
            HealthStatus::Warning,
            format!("version {version} does not match expected {expected}"),
        ),
        _ => match (recorded, live) {
            (Some(rec), Some(live)) if !versions_match(rec, live) => (
                HealthStatus::Warning,
                format!("manifest records {rec} but binary reports {live}"),
            ),
            (_, Some(live)) => (HealthStatus::Pass, format!("version {live}")),
            _ => (HealthStatus::Pass, "present".to_string()),
        },
    }
}

/// Per-tool reports plus counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DoctorReport {
    pub reports: Vec<HealthReport>,
    pub pass: usize,
    pub warning: usize,
    pub fail: usize,
    pub unknown: usize,
}

impl DoctorReport {
    pub fn from_reports(reports: Vec<HealthReport>) -> Self {
        let count = |s| reports.iter().filter(|r| r.status == s).count();
        Self {
            pass: count(HealthStatus::Pass),
            warning: count(HealthStatus::Warning),
            fail: count(HealthStatus::Fail),
            unknown: count(HealthStatus::Unknown),
            reports,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.fail > 0
    }

    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_failures())
    }

    pub fn get(&self, tool_id: &str) -> Option<&HealthReport> {
        self.reports.iter().find(|r| r.tool_id == tool_id)
    }
}

/// Runs health checks against a catalog, a manifest, and a probe.
#[derive(Clone)]
pub struct HealthChecker {
    catalog: Arc<ToolCatalog>,
    manifest: Arc<dyn ManifestStore>,
    probe: Arc<dyn BinaryProbe>,
}

impl HealthChecker {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        manifest: Arc<dyn ManifestStore>,
        probe: Arc<dyn BinaryProbe>,
    ) -> Self {
        Self {
            catalog,
            manifest,
            probe,
        }
    }

    pub async fn check(&self, tool_id: &str) -> ToolchestResult<HealthReport> {
        let tool = self
            .catalog
            .lookup(tool_id)
            .ok_or_else(|| CatalogError::UnknownTool {
                id: tool_id.to_string(),
            })?;
        let record = self.manifest.get(tool_id).await?;
        let outcome = self.probe.probe(tool).await;
        Ok(assess(tool, record.as_ref(), &outcome))
    }

    /// Check every catalog tool.
    pub async fn check_all(&self) -> ToolchestResult<DoctorReport> {
        let ids: Vec<String> = self.catalog.tools().iter().map(|t| t.id.clone()).collect();
        self.check_many(&ids).await
    }

    /// Check `ids` (tools or bundles) concurrently. Reports keep request
    /// order.
    pub async fn check_many(&self, ids: &[String]) -> ToolchestResult<DoctorReport> {
        let ids = self.catalog.expand_request(ids)?;
        let snapshot = self.manifest.get_all().await?;

        let mut join_set = JoinSet::new();
        for (idx, id) in ids.iter().enumerate() {
            let Some(tool) = self.catalog.lookup(id).cloned() else {
                continue;
            };
            let record = snapshot.get(id).cloned();
            let probe = Arc::clone(&self.probe);
            join_set.spawn(async move {
                let outcome = probe.probe(&tool).await;
                (idx, assess(&tool, record.as_ref(), &outcome))
            });
        }

        let mut slots: Vec<Option<HealthReport>> = vec![None; ids.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, report)) => slots[idx] = Some(report),
                Err(e) => warn!(error = %e, "health probe task failed"),
            }
        }

        let report = DoctorReport::from_reports(slots.into_iter().flatten().collect());
        crate::obs::emit_doctor_finished(report.pass, report.warning, report.fail, report.unknown);
        Ok(report)
    }
}
