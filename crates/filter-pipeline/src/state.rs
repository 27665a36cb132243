//! Lifecycle state and counters of a pipeline instance.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use strum::Display;

/// Lifecycle of a pipeline. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineState {
    /// Constructed, gate primed, output not yet handed out.
    Idle,
    /// Input is being read and batches dispatched.
    Running,
    /// Input is exhausted; the last batch is finishing.
    Draining,
    /// Output closed. The instance cannot be restarted.
    Closed,
}

/// Point-in-time snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub batches_dispatched: u64,
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_panicked: u64,
    pub results_produced: u64,
    pub results_matched: u64,
    pub results_delivered: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub batches_dispatched: AtomicU64,
    pub tasks_started: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_panicked: AtomicU64,
    pub results_produced: AtomicU64,
    pub results_matched: AtomicU64,
    pub results_delivered: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            results_produced: self.results_produced.load(Ordering::Relaxed),
            results_matched: self.results_matched.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
        }
    }
}
