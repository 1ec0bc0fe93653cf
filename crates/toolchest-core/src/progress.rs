//! Progress bus: broadcast of node state transitions to front ends.
//!
//! Publishing never blocks. A consumer that falls more than the channel
//! capacity behind loses the oldest events (`RecvError::Lagged`) instead of
//! stalling installation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::plan::NodeState;

pub const DEFAULT_CAPACITY: usize = 256;

/// One node changing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub tool_id: String,
    pub old_state: NodeState,
    pub new_state: NodeState,
    pub timestamp: DateTime<Utc>,
    /// Skip reason, failure summary, or installed version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Multi-producer, multi-consumer event stream.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Best-effort send; having no subscribers is fine.
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
