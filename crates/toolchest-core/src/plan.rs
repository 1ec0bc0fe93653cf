//! Execution plan produced by the resolver and consumed by the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ToolConfig;

/// Lifecycle of one plan node.
///
/// `Pending → Ready → Running → {Installed, Failed, Skipped}`. Only the
/// orchestrator's coordinator changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Installed,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Installed | NodeState::Failed | NodeState::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::Ready => "ready",
            NodeState::Running => "running",
            NodeState::Installed => "installed",
            NodeState::Failed => "failed",
            NodeState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a node ended `Skipped` without being attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency ended `Failed` or `Skipped`.
    Dependency { dependency: String },
    /// The run was cancelled before the node could finish installing.
    Cancelled,
    /// Stop-on-failure halted scheduling.
    Halted,
    /// The last recorded attempt failed and retries are disabled.
    PreviouslyFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Dependency { dependency } => {
                write!(f, "dependency '{dependency}' did not install")
            }
            SkipReason::Cancelled => f.write_str("cancelled"),
            SkipReason::Halted => f.write_str("halted after an earlier failure"),
            SkipReason::PreviouslyFailed => f.write_str("previous install failed"),
        }
    }
}

/// One tool scheduled for this run.
#[derive(Debug, Clone, Serialize)]
pub struct PlanNode {
    pub tool: ToolConfig,
    /// Dependencies restricted to the requested closure. Some may be
    /// pre-satisfied and therefore absent from the plan.
    pub dependencies: Vec<String>,
    pub state: NodeState,
    /// Ready layer this node falls into when everything succeeds.
    pub layer: usize,
    /// `true` when the caller asked for this tool (directly or via a bundle),
    /// `false` when it was pulled in as a dependency.
    pub requested: bool,
}

impl PlanNode {
    pub fn id(&self) -> &str {
        &self.tool.id
    }
}

/// Resolved, ordered plan for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub run_id: String,
    /// Nodes in execution order: by layer, then catalog declaration order.
    pub nodes: Vec<PlanNode>,
    /// Tool ids per ready layer.
    pub layers: Vec<Vec<String>>,
    /// Closure members already installed, in declaration order. They count
    /// as satisfied for their dependents and are not scheduled.
    pub pre_satisfied: Vec<String>,
    /// Requested tool ids after bundle expansion, in request order.
    pub requested: Vec<String>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Tool ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(PlanNode::id).collect()
    }
}
