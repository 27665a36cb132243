//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`FilterPipeline`](crate::FilterPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Initial concurrency bound. Must be at least 1.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: u8,
    /// Capacity of the merged output channel.
    ///
    /// Keep this small: producers stall on a full channel, which is what carries a
    /// slow consumer's backpressure back to the running tasks. 0 is treated as 1.
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,
    /// Emit a progress log every this many dispatched batches. 0 disables it.
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: u64,
}

fn default_concurrency_limit() -> u8 {
    1
}

fn default_result_buffer() -> usize {
    1
}

fn default_progress_log_interval() -> u64 {
    100
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            result_buffer: default_result_buffer(),
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

impl PipelineConfig {
    pub fn with_concurrency_limit(mut self, limit: u8) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_result_buffer(mut self, capacity: usize) -> Self {
        self.result_buffer = capacity;
        self
    }

    pub fn with_progress_log_interval(mut self, batches: u64) -> Self {
        self.progress_log_interval = batches;
        self
    }

    /// Output channel capacity actually used.
    pub(crate) fn effective_result_buffer(&self) -> usize {
        self.result_buffer.max(1)
    }
}
