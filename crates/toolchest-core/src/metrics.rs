//! Process-wide install counters.
//!
//! Call sites bump a [`Counter`]; [`Metrics::flush`] logs every value in one
//! `info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub static METRICS: Metrics = Metrics::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// An external install operation was invoked.
    Attempted,
    Succeeded,
    Failed,
    Skipped,
    /// Found already installed when it became ready.
    ShortCircuited,
}

impl Counter {
    const ALL: [Counter; 5] = [
        Counter::Attempted,
        Counter::Succeeded,
        Counter::Failed,
        Counter::Skipped,
        Counter::ShortCircuited,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::Attempted => "installs_attempted",
            Counter::Succeeded => "installs_succeeded",
            Counter::Failed => "installs_failed",
            Counter::Skipped => "nodes_skipped",
            Counter::ShortCircuited => "idempotent_short_circuits",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub installs_attempted: u64,
    pub installs_succeeded: u64,
    pub installs_failed: u64,
    pub nodes_skipped: u64,
    pub idempotent_short_circuits: u64,
}

pub struct Metrics {
    counters: [AtomicU64; 5],
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            counters: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    pub fn inc(&self, counter: Counter) {
        self.counters[counter.slot()].fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = counter.name(), "counter incremented");
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            installs_attempted: self.get(Counter::Attempted),
            installs_succeeded: self.get(Counter::Succeeded),
            installs_failed: self.get(Counter::Failed),
            nodes_skipped: self.get(Counter::Skipped),
            idempotent_short_circuits: self.get(Counter::ShortCircuited),
        }
    }

    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            installs_attempted = s.installs_attempted,
            installs_succeeded = s.installs_succeeded,
            installs_failed = s.installs_failed,
            nodes_skipped = s.nodes_skipped,
            idempotent_short_circuits = s.idempotent_short_circuits,
        );
    }

    pub fn reset(&self) {
        for counter in Counter::ALL {
            self.counters[counter.slot()].store(0, Ordering::Relaxed);
        }
    }
}
