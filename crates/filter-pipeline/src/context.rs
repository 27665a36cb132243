//! Shared execution context
//!
//! State shared between the pipeline handle, its dispatcher and every running
//! execution. This is the only pipeline-wide mutable state: the token pool, the
//! counters and the lifecycle state.

use tokio::sync::watch;

use crate::filter::ResultFilter;
use crate::gate::ConcurrencyGate;
use crate::state::{PipelineState, StatsCounters};

/// Shared context for one pipeline instance
pub(crate) struct ExecutionContext {
    /// Token pool bounding running tasks
    pub gate: ConcurrencyGate,
    /// Predicate applied to every produced result
    pub filter: Box<dyn ResultFilter>,
    /// Pipeline counters
    pub stats: StatsCounters,
    /// Lifecycle state publisher
    pub state: watch::Sender<PipelineState>,
    /// Batches between progress logs, 0 disables them
    pub progress_log_interval: u64,
}

impl ExecutionContext {
    pub fn new(
        gate: ConcurrencyGate,
        filter: Box<dyn ResultFilter>,
        progress_log_interval: u64,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            gate,
            filter,
            stats: StatsCounters::default(),
            state,
            progress_log_interval,
        }
    }

    /// Move the lifecycle forward. Never moves it back.
    pub fn advance(&self, next: PipelineState) {
        self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    pub fn current_state(&self) -> PipelineState {
        *self.state.borrow()
    }
}
