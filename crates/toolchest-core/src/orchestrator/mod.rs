//! Installation orchestrator: runs an [`ExecutionPlan`] with bounded
//! concurrency.
//!
//! One coordinator owns every node's state and the ready queue. Workers are
//! spawned tasks that only run the install operation and write the result to
//! the manifest; they hand a report back and never touch shared scheduling
//! state. Because the coordinator is the only writer of node state, all
//! transitions (and all progress events) are serialized without a lock.
//!
//! Ordering rules:
//! - a node is dispatched only after every in-plan dependency is `Installed`
//! - a worker writes its manifest record before the coordinator sees its
//!   completion, so dependents are released strictly after the write
//! - ready nodes are dispatched in catalog declaration order

mod summary;

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::{Id, JoinSet};
use toolchest_state::{InstallationRecord, ManifestError, ManifestResult, ManifestStore};
use tracing::{info, warn, Instrument};

pub use summary::{InstallSummary, RunOutcome, ToolOutcome};

use crate::cancel::CancelToken;
use crate::catalog::{ToolCatalog, ToolConfig};
use crate::error::ToolchestResult;
use crate::install::{InstallContext, InstallError, InstallOutcome, Installer};
use crate::metrics::{Counter, METRICS};
use crate::obs;
use crate::options::InstallationOptions;
use crate::plan::{ExecutionPlan, NodeState, PlanNode, SkipReason};
use crate::progress::{ProgressBus, ProgressEvent};
use crate::resolver::DependencyResolver;

/// Drives plans against a manifest with a pluggable installer.
pub struct Orchestrator {
    catalog: Arc<ToolCatalog>,
    manifest: Arc<dyn ManifestStore>,
    installer: Arc<dyn Installer>,
    bus: ProgressBus,
    install_dir: PathBuf,
    work_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        manifest: Arc<dyn ManifestStore>,
        installer: Arc<dyn Installer>,
    ) -> Self {
        let scratch = std::env::temp_dir().join("toolchest");
        Self {
            catalog,
            manifest,
            installer,
            bus: ProgressBus::new(),
            install_dir: scratch.join("bin"),
            work_dir: scratch.join("build"),
        }
    }

    pub fn with_progress_bus(mut self, bus: ProgressBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_dirs(mut self, install_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        self.install_dir = install_dir.into();
        self.work_dir = work_dir.into();
        self
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.bus
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Reload the manifest and resolve `request` against it.
    pub async fn plan(
        &self,
        request: &[String],
        options: &InstallationOptions,
    ) -> ToolchestResult<ExecutionPlan> {
        options.validate()?;
        let snapshot = self.manifest.reload().await?;
        let plan = DependencyResolver::new(&self.catalog).resolve(request, options, &snapshot)?;
        Ok(plan)
    }

    /// Plan and, unless `dry_run`, execute.
    pub async fn run(
        &self,
        request: &[String],
        options: &InstallationOptions,
        cancel: CancelToken,
    ) -> ToolchestResult<InstallSummary> {
        let plan = self.plan(request, options).await?;
        if options.dry_run {
            info!(run_id = %plan.run_id, scheduled = plan.len(), "dry run; nothing executed");
            return Ok(InstallSummary::dry_run(&plan));
        }
        self.execute(plan, options, cancel).await
    }

    /// Execute a resolved plan.
    ///
    /// Catalog and manifest problems abort the run with an error. Install
    /// failures do not; they end up in the summary.
    pub async fn execute(
        &self,
        plan: ExecutionPlan,
        options: &InstallationOptions,
        cancel: CancelToken,
    ) -> ToolchestResult<InstallSummary> {
        options.validate()?;
        let span = obs::run_span(&plan.run_id);
        self.execute_inner(plan, options, cancel).instrument(span).await
    }

    async fn execute_inner(
        &self,
        plan: ExecutionPlan,
        options: &InstallationOptions,
        mut cancel: CancelToken,
    ) -> ToolchestResult<InstallSummary> {
        let started = Instant::now();
        let run_id = plan.run_id.clone();
        obs::emit_run_started(&run_id, plan.len(), plan.pre_satisfied.len(), options.parallelism);

        let ctx = InstallContext {
            run_id: run_id.clone(),
            install_dir: self.install_dir.clone(),
            work_dir: self.work_dir.clone(),
            cancel: cancel.clone(),
        };

        let pre_satisfied = summary::pre_satisfied_outcomes(&plan);
        let mut coord = Coordinator::new(plan, &self.catalog, &self.bus, self.manifest.as_ref());
        let mut inflight = Inflight::default();
        let mut cancelled = false;
        let mut halted = false;
        let mut fatal: Option<ManifestError> = None;

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
            }
            if !cancelled && !halted && fatal.is_none() {
                if let Err(e) = self.dispatch(&mut coord, &mut inflight, options, &ctx).await {
                    fatal = Some(e);
                }
            }
            if inflight.tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    info!(running = inflight.tasks.len(), "cancellation requested; no new installs will start");
                    cancelled = true;
                }
                joined = inflight.tasks.join_next_with_id() => {
                    let accepting = !cancelled && !halted && fatal.is_none();
                    let completed = match joined {
                        Some(Ok((id, report))) => {
                            inflight.nodes.remove(&id);
                            coord.complete(report, accepting).await
                        }
                        Some(Err(e)) => match inflight.nodes.remove(&e.id()) {
                            Some(idx) => coord.lost(idx, &e.to_string()).await,
                            None => {
                                warn!(error = %e, "unknown install worker exited");
                                continue;
                            }
                        },
                        None => continue,
                    };
                    match completed {
                        Ok(Completion::Failed) if options.stop_on_failure && !halted => {
                            warn!("stopping after failure; running installs will finish");
                            halted = true;
                        }
                        Ok(Completion::Cancelled) => cancelled = true,
                        Ok(_) => {}
                        Err(e) => {
                            fatal.get_or_insert(e);
                        }
                    }
                }
            }
        }

        if fatal.is_none() {
            let reason = if cancelled {
                SkipReason::Cancelled
            } else {
                SkipReason::Halted
            };
            if let Err(e) = coord.finish_leftovers(reason).await {
                fatal = Some(e);
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        METRICS.flush();
        if let Some(e) = fatal {
            return Err(e.into());
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else if halted {
            RunOutcome::Halted
        } else {
            RunOutcome::Completed
        };

        let mut tools = pre_satisfied;
        tools.extend(coord.into_outcomes());
        let summary = InstallSummary {
            run_id,
            outcome,
            tools,
            duration_ms,
        };
        obs::emit_run_finished(
            &summary.run_id,
            duration_ms,
            summary.installed(),
            summary.failed(),
            summary.skipped(),
            &summary.outcome.to_string(),
        );
        Ok(summary)
    }

    /// Start ready nodes until the worker pool is full.
    ///
    /// Each node's manifest record is re-read first: one that became
    /// `Installed` since planning short-circuits without running.
    async fn dispatch(
        &self,
        coord: &mut Coordinator<'_>,
        inflight: &mut Inflight,
        options: &InstallationOptions,
        ctx: &InstallContext,
    ) -> ManifestResult<()> {
        while inflight.tasks.len() < options.parallelism {
            let Some(idx) = coord.pop_ready() else {
                break;
            };
            let tool = coord.nodes[idx].tool.clone();

            match self.manifest.get(&tool.id).await? {
                Some(rec) if rec.is_installed() && !options.force => {
                    METRICS.inc(Counter::ShortCircuited);
                    coord.short_circuit(idx, rec.installed_version);
                    continue;
                }
                Some(rec) if rec.is_failed() && !options.retry_failed && !options.force => {
                    coord.skip(idx, SkipReason::PreviouslyFailed).await?;
                    coord.skip_dependents(idx).await?;
                    continue;
                }
                _ => {}
            }

            coord.transition(idx, NodeState::Running, None);
            METRICS.inc(Counter::Attempted);
            let handle = inflight.tasks.spawn(
                run_worker(
                    idx,
                    tool,
                    options.clone(),
                    ctx.clone(),
                    Arc::clone(&self.installer),
                    Arc::clone(&self.manifest),
                )
                .in_current_span(),
            );
            inflight.nodes.insert(handle.id(), idx);
        }
        Ok(())
    }
}

/// Running workers and the node each one is installing.
#[derive(Default)]
struct Inflight {
    tasks: JoinSet<WorkerReport>,
    nodes: HashMap<Id, usize>,
}

/// How a worker's install ended.
enum WorkerResult {
    Installed(InstallOutcome),
    Failed(String),
    /// Interrupted by run cancellation; not a tool failure.
    Cancelled,
}

/// What a worker hands back to the coordinator.
struct WorkerReport {
    idx: usize,
    result: WorkerResult,
    /// Outcome of writing the terminal record, done before reporting.
    write: ManifestResult<()>,
    duration_ms: u64,
}

/// Terminal state a completed node reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Installed,
    Failed,
    Cancelled,
}

async fn run_worker(
    idx: usize,
    tool: ToolConfig,
    options: InstallationOptions,
    ctx: InstallContext,
    installer: Arc<dyn Installer>,
    manifest: Arc<dyn ManifestStore>,
) -> WorkerReport {
    let started = Instant::now();
    let limit = tool
        .timeout_secs
        .map(Duration::from_secs)
        .or(options.install_timeout);

    let attempt = AssertUnwindSafe(installer.install(&tool, &options, &ctx)).catch_unwind();
    let caught = match limit {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(caught) => caught,
            Err(_) => Ok(Err(InstallError::TimedOut {
                secs: limit.as_secs(),
            })),
        },
        None => attempt.await,
    };
    let result = caught.unwrap_or_else(|panic| Err(InstallError::Panicked(panic_message(panic.as_ref()))));

    let (result, write) = match result {
        Ok(outcome) => {
            let write = manifest.put(installed_record(&tool, &outcome)).await;
            (WorkerResult::Installed(outcome), write)
        }
        Err(InstallError::Cancelled) if ctx.cancel.is_cancelled() => {
            let write = record_cancelled(&tool, manifest.as_ref()).await;
            (WorkerResult::Cancelled, write)
        }
        Err(e) => {
            let diagnostic = e.to_string();
            let rec = InstallationRecord::failed(&tool.id, &tool.version, tool.method(), diagnostic.as_str());
            (WorkerResult::Failed(diagnostic), manifest.put(rec).await)
        }
    };

    WorkerReport {
        idx,
        result,
        write,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

fn installed_record(tool: &ToolConfig, outcome: &InstallOutcome) -> InstallationRecord {
    let mut rec = InstallationRecord::installed(&tool.id, &outcome.version, outcome.method);
    if let Some(sum) = &outcome.checksum {
        rec = rec.with_checksum(sum.as_str());
    }
    if !outcome.diagnostic.trim().is_empty() {
        rec = rec.with_diagnostic(outcome.diagnostic.as_str());
    }
    rec
}

/// A cancelled install leaves an existing `Installed` record alone and
/// otherwise records a `cancelled` skip.
async fn record_cancelled(tool: &ToolConfig, manifest: &dyn ManifestStore) -> ManifestResult<()> {
    match manifest.get(&tool.id).await? {
        Some(rec) if rec.is_installed() => Ok(()),
        _ => {
            let reason = SkipReason::Cancelled.to_string();
            manifest
                .put(InstallationRecord::skipped(&tool.id, &tool.version, tool.method(), reason))
                .await
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Single owner of node state and the ready queue for one run.
struct Coordinator<'a> {
    run_id: String,
    nodes: Vec<PlanNode>,
    outcomes: Vec<ToolOutcome>,
    /// Not-yet-installed in-plan dependencies per node.
    waiting_on: Vec<usize>,
    /// In-plan dependents per node, in plan order.
    dependents: Vec<Vec<usize>>,
    /// `(declaration index, node index)`; pops in declaration order.
    ready: BTreeSet<(usize, usize)>,
    decl: Vec<usize>,
    bus: &'a ProgressBus,
    manifest: &'a dyn ManifestStore,
}

impl<'a> Coordinator<'a> {
    fn new(
        plan: ExecutionPlan,
        catalog: &ToolCatalog,
        bus: &'a ProgressBus,
        manifest: &'a dyn ManifestStore,
    ) -> Self {
        let index: HashMap<&str, usize> = plan
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect();

        let n = plan.nodes.len();
        let mut waiting_on = vec![0; n];
        let mut dependents = vec![Vec::new(); n];
        for (i, node) in plan.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                // Dependencies outside the plan are pre-satisfied.
                if let Some(&d) = index.get(dep.as_str()) {
                    waiting_on[i] += 1;
                    dependents[d].push(i);
                }
            }
        }
        let decl = plan
            .nodes
            .iter()
            .map(|n| catalog.declaration_index(n.id()).unwrap_or(usize::MAX))
            .collect();
        let outcomes = plan
            .nodes
            .iter()
            .map(|n| ToolOutcome::new(n.id(), n.state, n.requested))
            .collect();

        let mut coord = Self {
            run_id: plan.run_id,
            nodes: plan.nodes,
            outcomes,
            waiting_on,
            dependents,
            ready: BTreeSet::new(),
            decl,
            bus,
            manifest,
        };
        for idx in 0..n {
            if coord.waiting_on[idx] == 0 {
                coord.make_ready(idx);
            }
        }
        coord
    }

    fn transition(&mut self, idx: usize, new: NodeState, detail: Option<String>) {
        let node = &mut self.nodes[idx];
        let old = node.state;
        node.state = new;
        self.outcomes[idx].state = new;
        obs::emit_node_transition(&self.run_id, &node.tool.id, old, new);
        self.bus.publish(ProgressEvent {
            run_id: self.run_id.clone(),
            tool_id: node.tool.id.clone(),
            old_state: old,
            new_state: new,
            timestamp: chrono::Utc::now(),
            detail,
        });
    }

    fn make_ready(&mut self, idx: usize) {
        self.transition(idx, NodeState::Ready, None);
        self.ready.insert((self.decl[idx], idx));
    }

    fn pop_ready(&mut self) -> Option<usize> {
        self.ready.pop_first().map(|(_, idx)| idx)
    }

    /// A dependency reached `Installed`. Dependents whose last dependency
    /// this was become ready, unless scheduling has stopped.
    fn release_dependents(&mut self, idx: usize, accepting: bool) {
        for d in self.dependents[idx].clone() {
            if self.nodes[d].state != NodeState::Pending {
                continue;
            }
            self.waiting_on[d] -= 1;
            if self.waiting_on[d] == 0 && accepting {
                self.make_ready(d);
            }
        }
    }

    fn short_circuit(&mut self, idx: usize, version: String) {
        self.outcomes[idx].short_circuited = true;
        self.outcomes[idx].version = Some(version.clone());
        self.transition(idx, NodeState::Installed, Some(version));
        self.release_dependents(idx, true);
    }

    /// Apply a worker's report.
    async fn complete(&mut self, report: WorkerReport, accepting: bool) -> ManifestResult<Completion> {
        let idx = report.idx;
        self.outcomes[idx].duration_ms = report.duration_ms;
        if let Err(e) = report.write {
            obs::emit_manifest_write_failed(&self.run_id, self.nodes[idx].id(), &e);
            self.transition(idx, NodeState::Failed, Some(e.to_string()));
            return Err(e);
        }

        match report.result {
            WorkerResult::Installed(outcome) => {
                METRICS.inc(Counter::Succeeded);
                self.outcomes[idx].version = Some(outcome.version.clone());
                self.transition(idx, NodeState::Installed, Some(outcome.version));
                self.release_dependents(idx, accepting);
                Ok(Completion::Installed)
            }
            WorkerResult::Failed(diagnostic) => {
                self.fail(idx, diagnostic).await?;
                Ok(Completion::Failed)
            }
            WorkerResult::Cancelled => {
                // Dependents stay pending and are resolved as cancelled
                // with the rest of the leftovers.
                METRICS.inc(Counter::Skipped);
                let reason = SkipReason::Cancelled;
                self.transition(idx, NodeState::Skipped, Some(reason.to_string()));
                self.outcomes[idx].skip_reason = Some(reason);
                Ok(Completion::Cancelled)
            }
        }
    }

    /// A worker task died without reporting. Record the node as failed so
    /// its dependents are skipped like after any other failure.
    async fn lost(&mut self, idx: usize, detail: &str) -> ManifestResult<Completion> {
        let diagnostic = format!("install worker exited without reporting: {detail}");
        let tool = &self.nodes[idx].tool;
        let rec = InstallationRecord::failed(&tool.id, &tool.version, tool.method(), diagnostic.as_str());
        if let Err(e) = self.manifest.put(rec).await {
            obs::emit_manifest_write_failed(&self.run_id, self.nodes[idx].id(), &e);
            self.transition(idx, NodeState::Failed, Some(e.to_string()));
            return Err(e);
        }
        self.fail(idx, diagnostic).await?;
        Ok(Completion::Failed)
    }

    async fn fail(&mut self, idx: usize, diagnostic: String) -> ManifestResult<()> {
        METRICS.inc(Counter::Failed);
        let headline = diagnostic.lines().next().unwrap_or_default().to_string();
        warn!(tool_id = %self.nodes[idx].id(), error = %headline, "install failed");
        self.outcomes[idx].diagnostic = Some(diagnostic);
        self.transition(idx, NodeState::Failed, Some(headline));
        self.skip_dependents(idx).await
    }

    /// Mark `idx` skipped and record why. A skip never replaces an
    /// `Installed` record, and `PreviouslyFailed` keeps the earlier failure
    /// record untouched.
    async fn skip(&mut self, idx: usize, reason: SkipReason) -> ManifestResult<()> {
        let detail = reason.to_string();
        if reason != SkipReason::PreviouslyFailed {
            let tool = &self.nodes[idx].tool;
            let keep = self
                .manifest
                .get(&tool.id)
                .await?
                .is_some_and(|r| r.is_installed());
            if !keep {
                let rec = InstallationRecord::skipped(&tool.id, &tool.version, tool.method(), detail.as_str());
                self.manifest.put(rec).await?;
            }
        }
        METRICS.inc(Counter::Skipped);
        self.outcomes[idx].skip_reason = Some(reason);
        self.transition(idx, NodeState::Skipped, Some(detail));
        Ok(())
    }

    /// Skip everything downstream of a node that did not install. Each
    /// skipped node names the dependency it was waiting on.
    async fn skip_dependents(&mut self, idx: usize) -> ManifestResult<()> {
        let mut stack = vec![idx];
        while let Some(culprit) = stack.pop() {
            for d in self.dependents[culprit].clone() {
                if self.nodes[d].state.is_terminal() {
                    continue;
                }
                let dependency = self.nodes[culprit].id().to_string();
                self.skip(d, SkipReason::Dependency { dependency }).await?;
                stack.push(d);
            }
        }
        Ok(())
    }

    /// Resolve nodes left behind when scheduling stopped early.
    async fn finish_leftovers(&mut self, reason: SkipReason) -> ManifestResult<()> {
        self.ready.clear();
        for idx in 0..self.nodes.len() {
            match self.nodes[idx].state {
                NodeState::Pending | NodeState::Ready => self.skip(idx, reason.clone()).await?,
                NodeState::Running => {
                    let msg = "install worker exited without reporting".to_string();
                    self.outcomes[idx].diagnostic = Some(msg.clone());
                    self.transition(idx, NodeState::Failed, Some(msg));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn into_outcomes(self) -> Vec<ToolOutcome> {
        self.outcomes
    }
}
