//! Structured observability hooks for the install run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span carrying `run_id`
//! - Emission functions for run start, node transitions, run finish, and
//!   manifest write failures
//!
//! Events are emitted at `info!` level (filter with `TOOLCHEST_LOG`).

use tracing::info;

use crate::plan::NodeState;

/// Run-scoped span. Attach it with [`tracing::Instrument::instrument`] so
/// everything logged during the run carries `run_id`.
///
/// ```ignore
/// orchestrate(plan).instrument(run_span(&plan.run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("toolchest.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, scheduled: usize, pre_satisfied: usize, parallelism: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        scheduled = scheduled,
        pre_satisfied = pre_satisfied,
        parallelism = parallelism,
    );
}

/// Emit event: a plan node changed state.
pub fn emit_node_transition(run_id: &str, tool_id: &str, old: NodeState, new: NodeState) {
    if new.is_terminal() {
        info!(event = "node.transition", run_id = %run_id, tool_id = %tool_id, from = %old, to = %new);
    } else {
        tracing::debug!(event = "node.transition", run_id = %run_id, tool_id = %tool_id, from = %old, to = %new);
    }
}

/// Emit event: run finished with per-state counts.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    installed: usize,
    failed: usize,
    skipped: usize,
    outcome: &str,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        installed = installed,
        failed = failed,
        skipped = skipped,
        outcome = %outcome,
    );
}

/// Emit event: a manifest write failed; the run will abort (error level).
pub fn emit_manifest_write_failed(run_id: &str, tool_id: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "manifest.write_failed", run_id = %run_id, tool_id = %tool_id, error = %error);
}

/// Emit event: doctor finished.
pub fn emit_doctor_finished(pass: usize, warning: usize, fail: usize, unknown: usize) {
    info!(
        event = "doctor.finished",
        pass = pass,
        warning = warning,
        fail = fail,
        unknown = unknown,
    );
}
