//! `Toolchest`: the invocation surface front ends bind to.

use std::sync::Arc;

use serde::Serialize;
use toolchest_state::{FileManifestStore, InstallationRecord, ManifestStore};
use tokio::sync::broadcast;

use crate::cancel::CancelToken;
use crate::catalog::ToolCatalog;
use crate::config::ToolchestConfig;
use crate::error::ToolchestResult;
use crate::health::probe::{BinaryProbe, SystemProbe};
use crate::health::{DoctorReport, HealthChecker};
use crate::install::{Installer, MethodInstaller};
use crate::options::InstallationOptions;
use crate::orchestrator::{InstallSummary, Orchestrator};
use crate::plan::ExecutionPlan;
use crate::progress::{ProgressBus, ProgressEvent};

/// One line of `status`: a tool and its manifest record, if any.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub tool_id: String,
    /// `false` for records of tools since removed from the catalog.
    pub in_catalog: bool,
    pub record: Option<InstallationRecord>,
}

/// Catalog, manifest, installer, and probe wired together.
pub struct Toolchest {
    catalog: Arc<ToolCatalog>,
    manifest: Arc<dyn ManifestStore>,
    orchestrator: Orchestrator,
    health: HealthChecker,
}

impl Toolchest {
    /// Production wiring: catalog file, JSON manifest, method dispatch, and
    /// filesystem probes.
    pub fn from_config(config: &ToolchestConfig) -> ToolchestResult<Self> {
        let catalog = Arc::new(ToolCatalog::load(&config.catalog_path)?);
        let manifest: Arc<dyn ManifestStore> =
            Arc::new(FileManifestStore::new(&config.manifest_path));
        let probe: Arc<dyn BinaryProbe> = Arc::new(SystemProbe::new(&config.install_dir));
        let installer: Arc<dyn Installer> =
            Arc::new(MethodInstaller::with_probe(Arc::clone(&probe)));
        let mut toolchest = Self::new(catalog, manifest, installer, probe);
        toolchest.orchestrator = toolchest
            .orchestrator
            .with_dirs(&config.install_dir, &config.work_dir);
        Ok(toolchest)
    }

    pub fn new(
        catalog: Arc<ToolCatalog>,
        manifest: Arc<dyn ManifestStore>,
        installer: Arc<dyn Installer>,
        probe: Arc<dyn BinaryProbe>,
    ) -> Self {
        let orchestrator =
            Orchestrator::new(Arc::clone(&catalog), Arc::clone(&manifest), installer);
        let health = HealthChecker::new(Arc::clone(&catalog), Arc::clone(&manifest), probe);
        Self {
            catalog,
            manifest,
            orchestrator,
            health,
        }
    }

    pub fn with_progress_bus(mut self, bus: ProgressBus) -> Self {
        self.orchestrator = self.orchestrator.with_progress_bus(bus);
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.orchestrator.progress().subscribe()
    }

    pub async fn plan(
        &self,
        request: &[String],
        options: &InstallationOptions,
    ) -> ToolchestResult<ExecutionPlan> {
        self.orchestrator.plan(request, options).await
    }

    pub async fn install(
        &self,
        request: &[String],
        options: &InstallationOptions,
        cancel: CancelToken,
    ) -> ToolchestResult<InstallSummary> {
        self.orchestrator.run(request, options, cancel).await
    }

    /// Every catalog tool in declaration order, then records for tools the
    /// catalog no longer knows.
    pub async fn status(&self) -> ToolchestResult<Vec<StatusEntry>> {
        let mut snapshot = self.manifest.reload().await?;
        let mut entries: Vec<StatusEntry> = self
            .catalog
            .tools()
            .iter()
            .map(|tool| StatusEntry {
                tool_id: tool.id.clone(),
                in_catalog: true,
                record: snapshot.remove(&tool.id),
            })
            .collect();
        entries.extend(snapshot.into_iter().map(|(tool_id, record)| StatusEntry {
            tool_id,
            in_catalog: false,
            record: Some(record),
        }));
        Ok(entries)
    }

    /// Health of `ids`, or of every catalog tool when `ids` is empty.
    pub async fn doctor(&self, ids: &[String]) -> ToolchestResult<DoctorReport> {
        if ids.is_empty() {
            self.health.check_all().await
        } else {
            self.health.check_many(ids).await
        }
    }
}
