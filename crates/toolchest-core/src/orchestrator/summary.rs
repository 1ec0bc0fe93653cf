//! Aggregate result of one run.

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::plan::{ExecutionPlan, NodeState, SkipReason};

/// How the run as a whole ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every scheduled node reached a terminal state.
    Completed,
    /// A cancellation signal stopped scheduling.
    Cancelled,
    /// Stop-on-failure stopped scheduling after a failure.
    Halted,
    /// Nothing was executed.
    DryRun,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Halted => "halted",
            RunOutcome::DryRun => "dry-run",
        })
    }
}

/// Final state of one tool in the run's closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub tool_id: String,
    pub state: NodeState,
    /// Asked for by the caller rather than pulled in as a dependency.
    pub requested: bool,
    /// Already installed before the run; not scheduled.
    pub pre_satisfied: bool,
    /// Found installed at dispatch time; the install operation was not run.
    pub short_circuited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Captured failure output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub duration_ms: u64,
}

impl ToolOutcome {
    pub(crate) fn new(tool_id: impl Into<String>, state: NodeState, requested: bool) -> Self {
        Self {
            tool_id: tool_id.into(),
            state,
            requested,
            pre_satisfied: false,
            short_circuited: false,
            version: None,
            skip_reason: None,
            diagnostic: None,
            duration_ms: 0,
        }
    }
}

/// Per-tool results for one run.
#[derive(Debug, Clone, Serialize)]
pub struct InstallSummary {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Pre-satisfied tools first, then scheduled tools in plan order.
    pub tools: Vec<ToolOutcome>,
    pub duration_ms: u64,
}

impl InstallSummary {
    /// Summary of a plan that was not executed.
    pub fn dry_run(plan: &ExecutionPlan) -> Self {
        let mut tools = pre_satisfied_outcomes(plan);
        tools.extend(
            plan.nodes
                .iter()
                .map(|n| ToolOutcome::new(n.id(), NodeState::Pending, n.requested)),
        );
        Self {
            run_id: plan.run_id.clone(),
            outcome: RunOutcome::DryRun,
            tools,
            duration_ms: 0,
        }
    }

    pub fn get(&self, tool_id: &str) -> Option<&ToolOutcome> {
        self.tools.iter().find(|t| t.tool_id == tool_id)
    }

    pub fn state_of(&self, tool_id: &str) -> Option<NodeState> {
        self.get(tool_id).map(|t| t.state)
    }

    pub fn count(&self, state: NodeState) -> usize {
        self.tools
            .iter()
            .filter(|t| !t.pre_satisfied && t.state == state)
            .count()
    }

    pub fn installed(&self) -> usize {
        self.count(NodeState::Installed)
    }

    pub fn failed(&self) -> usize {
        self.count(NodeState::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(NodeState::Skipped)
    }

    /// `true` only if the run completed and every requested, not
    /// pre-satisfied tool ended `Installed`.
    pub fn is_success(&self) -> bool {
        match self.outcome {
            RunOutcome::DryRun => true,
            RunOutcome::Cancelled | RunOutcome::Halted => false,
            RunOutcome::Completed => self
                .tools
                .iter()
                .filter(|t| t.requested && !t.pre_satisfied)
                .all(|t| t.state == NodeState::Installed),
        }
    }

    /// Process exit code: 0 success, 1 failures or skips, 130 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Cancelled => 130,
            _ if self.is_success() => 0,
            _ => 1,
        }
    }

    /// Plain-text report: one line per tool, then totals.
    pub fn render(&self) -> String {
        let width = self.tools.iter().map(|t| t.tool_id.len()).max().unwrap_or(0);
        let mut out = String::new();
        for t in &self.tools {
            let state = if t.pre_satisfied {
                "installed (already)".to_string()
            } else if t.short_circuited {
                "installed (unchanged)".to_string()
            } else {
                t.state.to_string()
            };
            let _ = write!(out, "{:<width$}  {}", t.tool_id, state);
            if let Some(version) = &t.version {
                let _ = write!(out, "  {version}");
            }
            if let Some(reason) = &t.skip_reason {
                let _ = write!(out, "  ({reason})");
            }
            out.push('\n');
            if let Some(diag) = t.diagnostic.as_deref().filter(|_| t.state == NodeState::Failed) {
                for line in diag.lines() {
                    let _ = writeln!(out, "{:<width$}    | {line}", "");
                }
            }
        }
        let _ = write!(
            out,
            "{}: {} installed, {} failed, {} skipped, {} already installed",
            self.outcome,
            self.installed(),
            self.failed(),
            self.skipped(),
            self.tools.iter().filter(|t| t.pre_satisfied).count(),
        );
        out
    }
}

impl fmt::Display for InstallSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub(crate) fn pre_satisfied_outcomes(plan: &ExecutionPlan) -> Vec<ToolOutcome> {
    plan.pre_satisfied
        .iter()
        .map(|id| {
            let mut t = ToolOutcome::new(
                id.as_str(),
                NodeState::Installed,
                plan.requested.iter().any(|r| r == id),
            );
            t.pre_satisfied = true;
            t
        })
        .collect()
}
