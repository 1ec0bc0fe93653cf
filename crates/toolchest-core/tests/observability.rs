//! Observability tests for the install run lifecycle.
//!
//! These verify that the structured emitters and a full traced run execute
//! cleanly under a capturing subscriber.

use std::sync::Arc;

use async_trait::async_trait;
use toolchest_core::obs::{
    emit_doctor_finished, emit_manifest_write_failed, emit_node_transition, emit_run_finished,
    emit_run_started, run_span,
};
use toolchest_core::{
    CancelToken, InstallContext, InstallError, InstallOutcome, InstallRef, InstallationOptions,
    Installer, ManifestStore, NodeState, Orchestrator, ToolCatalog, ToolConfig,
};
use toolchest_state::fakes::MemoryManifestStore;
use tracing::Instrument;
use tracing_test::traced_test;

/// Test: emit_run_started creates an info-level event
#[traced_test]
#[test]
fn test_emit_run_started_logs_counts() {
    emit_run_started("run-123", 4, 1, 2);
}

/// Test: emit_run_finished creates an info-level event
#[traced_test]
#[test]
fn test_emit_run_finished_logs_outcome() {
    emit_run_finished("run-456", 5000, 3, 1, 2, "halted");
}

#[traced_test]
#[test]
fn test_emit_node_transition_non_terminal_is_debug() {
    emit_node_transition("run-789", "jq", NodeState::Pending, NodeState::Ready);
}

/// Test: emit_manifest_write_failed creates an error-level event
#[traced_test]
#[test]
fn test_emit_manifest_write_failed_logs_error() {
    let error_msg = "no space left on device";
    emit_manifest_write_failed("run-err-001", "protoc", &error_msg);
}

#[traced_test]
#[test]
fn test_emit_doctor_finished() {
    emit_doctor_finished(3, 1, 0, 2);
}

#[traced_test]
#[tokio::test]
async fn test_run_span_instruments_async_work() {
    async {
        emit_node_transition("span-run", "fd", NodeState::Running, NodeState::Installed);
    }
    .instrument(run_span("span-run"))
    .await;
}

struct AlwaysOk;

#[async_trait]
impl Installer for AlwaysOk {
    async fn install(
        &self,
        tool: &ToolConfig,
        _options: &InstallationOptions,
        _ctx: &InstallContext,
    ) -> Result<InstallOutcome, InstallError> {
        tracing::info!(tool_id = %tool.id, "fake install");
        Ok(InstallOutcome::new("1.0.0", tool.method()))
    }
}

/// Test: a whole run emits its lifecycle under the capturing subscriber
#[traced_test]
#[tokio::test]
async fn test_full_run_is_traced() {
    let catalog = Arc::new(
        ToolCatalog::new(
            vec![
                ToolConfig::new("a", InstallRef::command(["true"])),
                ToolConfig::new("b", InstallRef::command(["true"])).with_dependencies(["a"]),
            ],
            vec![],
        )
        .unwrap(),
    );
    let manifest: Arc<dyn ManifestStore> = Arc::new(MemoryManifestStore::new());
    let orch = Orchestrator::new(catalog, manifest, Arc::new(AlwaysOk));

    let summary = orch
        .run(
            &["b".to_string()],
            &InstallationOptions::default(),
            CancelToken::never(),
        )
        .await
        .unwrap();
    assert_eq!(summary.installed(), 2);
}
