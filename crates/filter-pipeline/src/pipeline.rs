//! # Filter Pipeline
//!
//! The handle a caller constructs and drives. Construction primes the concurrency
//! gate, [`FilterPipeline::start`] spawns the dispatcher and hands out the merged
//! output, and [`FilterPipeline::set_concurrency`] resizes the gate at any time,
//! before or after start and from any number of callers.
//!
//! ## Usage
//!
//! Build the pipeline from a stream (or channel) of [`TaskBatch`]es, start it once
//! and read the [`ResultStream`] until it ends. The output ends once the input has
//! ended and the last batch has drained.

use std::sync::Arc;

use futures::Stream;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::dispatcher;
use crate::filter::ResultFilter;
use crate::gate::{ConcurrencyGate, assert_valid_limit};
use crate::state::{PipelineState, PipelineStats};
use crate::stream::ResultStream;
use crate::task::{ResultSequence, Task, TaskBatch};
use crate::{PipelineError, Result};

/// Bounded-parallelism fan-out/fan-in pipeline with inline filtering.
pub struct FilterPipeline {
    /// Input, taken by the first `start`.
    batches: Mutex<Option<BoxStream<'static, TaskBatch>>>,
    context: Arc<ExecutionContext>,
    result_buffer: usize,
}

impl FilterPipeline {
    /// Create a pipeline over `batches` with `concurrency_limit` initial tokens.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency_limit` is 0.
    #[track_caller]
    pub fn new<S, F>(batches: S, concurrency_limit: u8, filter: F) -> Self
    where
        S: Stream<Item = TaskBatch> + Send + 'static,
        F: ResultFilter,
    {
        let config = PipelineConfig::default().with_concurrency_limit(concurrency_limit);
        Self::with_config(batches, config, filter)
    }

    /// Create a pipeline reading batches from a channel.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency_limit` is 0.
    #[track_caller]
    pub fn from_receiver<F>(
        batches: mpsc::Receiver<TaskBatch>,
        concurrency_limit: u8,
        filter: F,
    ) -> Self
    where
        F: ResultFilter,
    {
        let batches = stream::unfold(batches, |mut rx| async move {
            rx.recv().await.map(|batch| (batch, rx))
        });
        Self::new(batches, concurrency_limit, filter)
    }

    /// Create a pipeline with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.concurrency_limit` is 0.
    #[track_caller]
    pub fn with_config<S, F>(batches: S, config: PipelineConfig, filter: F) -> Self
    where
        S: Stream<Item = TaskBatch> + Send + 'static,
        F: ResultFilter,
    {
        let gate = ConcurrencyGate::new(config.concurrency_limit);
        let context = ExecutionContext::new(gate, Box::new(filter), config.progress_log_interval);

        Self {
            batches: Mutex::new(Some(batches.boxed())),
            context: Arc::new(context),
            result_buffer: config.effective_result_buffer(),
        }
    }

    /// Start consuming the input and return the merged, filtered output.
    ///
    /// Must be called from within a tokio runtime. Only the first call starts the
    /// pipeline; later calls fail with [`PipelineError::AlreadyStarted`] and leave
    /// the running pipeline alone.
    pub fn start(&self) -> Result<ResultStream> {
        let Some(batches) = self.batches.lock().take() else {
            warn!(state = %self.state(), "Pipeline start requested twice");
            return Err(PipelineError::AlreadyStarted);
        };

        let (tx, rx) = mpsc::channel(self.result_buffer);
        info!(
            limit = self.concurrency_limit(),
            result_buffer = self.result_buffer,
            "Starting filter pipeline"
        );
        tokio::spawn(dispatcher::run(batches, self.context.clone(), tx));

        Ok(ResultStream::new(rx))
    }

    /// Change the concurrency bound.
    ///
    /// Growing completes immediately. Shrinking completes once running tasks have
    /// returned enough tokens; tasks already running are never interrupted.
    ///
    /// # Panics
    ///
    /// Panics if `level` is 0.
    #[track_caller]
    pub fn set_concurrency(&self, level: u8) -> impl Future<Output = ()> + Send + '_ {
        self.context.gate.resize(level)
    }

    /// The concurrency bound currently in effect.
    pub fn concurrency_limit(&self) -> u8 {
        self.context.gate.limit()
    }

    /// The gate bounding this pipeline's running tasks.
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.context.gate
    }

    pub fn state(&self) -> PipelineState {
        self.context.current_state()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.context.state.subscribe()
    }

    /// Wait until the output has been closed.
    pub async fn closed(&self) {
        let mut state = self.subscribe_state();
        // The sender lives in our own context, so the channel cannot close under us.
        let _ = state.wait_for(|state| *state == PipelineState::Closed).await;
    }

    pub fn stats(&self) -> PipelineStats {
        self.context.stats.snapshot()
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("state", &self.state())
            .field("limit", &self.concurrency_limit())
            .field("result_buffer", &self.result_buffer)
            .finish_non_exhaustive()
    }
}

/// A pipeline can run as a task of another pipeline.
impl Task for FilterPipeline {
    fn start(self: Box<Self>) -> ResultSequence {
        match FilterPipeline::start(&self) {
            Ok(results) => results.boxed(),
            Err(e) => {
                warn!(error = %e, "Nested pipeline could not be started");
                stream::empty().boxed()
            }
        }
    }

    /// Resizes this pipeline's gate in the background.
    fn set_concurrency_hint(&self, level: u8) {
        assert_valid_limit(level);
        let context = self.context.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { context.gate.resize(level).await });
            }
            Err(_) => warn!(level, "No tokio runtime, concurrency hint ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FnFilter, MatchAll};
    use crate::test_utils::{Occupancy, init_tracing, occupying, scripted};
    use regex::Regex;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    #[should_panic(expected = "such a concurrency limit is not allowed")]
    fn test_zero_initial_limit_is_fatal() {
        let _ = FilterPipeline::new(stream::empty::<TaskBatch>(), 0, MatchAll);
    }

    #[tokio::test]
    #[should_panic(expected = "such a concurrency limit is not allowed")]
    async fn test_zero_set_concurrency_is_fatal() {
        let pipeline = FilterPipeline::new(stream::empty::<TaskBatch>(), 2, MatchAll);
        pipeline.set_concurrency(0).await;
    }

    #[test]
    fn test_new_pipeline_is_idle() {
        let pipeline = FilterPipeline::new(stream::empty::<TaskBatch>(), 3, MatchAll);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.concurrency_limit(), 3);
        assert_eq!(pipeline.gate().available(), 3);
        assert_eq!(pipeline.stats(), PipelineStats::default());
    }

    #[tokio::test]
    async fn test_set_concurrency_before_start() {
        let pipeline = FilterPipeline::new(stream::empty::<TaskBatch>(), 3, MatchAll);
        pipeline.set_concurrency(1).await;
        assert_eq!(pipeline.concurrency_limit(), 1);
        pipeline.set_concurrency(7).await;
        assert_eq!(pipeline.concurrency_limit(), 7);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        init_tracing();
        let pipeline = FilterPipeline::new(stream::empty::<TaskBatch>(), 1, MatchAll);
        let mut results = pipeline.start().unwrap();

        assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted)));
        assert!(results.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_reaches_closed() {
        init_tracing();
        let batches = stream::iter(vec![vec![scripted([(1, "x")])]]);
        let pipeline = FilterPipeline::new(batches, 1, MatchAll);
        let mut states = pipeline.subscribe_state();
        assert_eq!(*states.borrow_and_update(), PipelineState::Idle);

        let mut results = pipeline.start().unwrap();
        assert_eq!(results.recv().await.as_deref(), Some("x"));
        assert!(results.recv().await.is_none());

        timeout(Duration::from_secs(1), pipeline.closed())
            .await
            .expect("pipeline closes once the output is drained");
        assert_eq!(pipeline.state(), PipelineState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stats_count_filtered_results() {
        init_tracing();
        let batches = stream::iter(vec![
            vec![scripted([(1, "keep-1"), (1, "drop")]), scripted([(2, "keep-2")])],
            Vec::new(),
            vec![scripted([(1, "drop"), (1, "drop")])],
        ]);
        let filter = FnFilter::new(|result: &str| result.starts_with("keep"));
        let pipeline = FilterPipeline::new(batches, 2, filter);

        let results: Vec<String> = pipeline.start().unwrap().collect().await;
        pipeline.closed().await;

        assert_eq!(results.len(), 2);
        let stats = pipeline.stats();
        assert_eq!(stats.batches_dispatched, 3);
        assert_eq!(stats.tasks_started, 3);
        assert_eq!(stats.tasks_completed, 3);
        assert_eq!(stats.results_produced, 5);
        assert_eq!(stats.results_matched, 2);
        assert_eq!(stats.results_delivered, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_peak_concurrency_respects_limit() {
        init_tracing();
        let occupancy = Occupancy::default();
        let batch: TaskBatch = (0..12)
            .map(|i| occupying(&occupancy, 20, &format!("r{i}")))
            .collect();
        let pipeline = FilterPipeline::new(stream::iter(vec![batch]), 3, MatchAll);

        let results: Vec<String> = pipeline.start().unwrap().collect().await;

        assert_eq!(results.len(), 12);
        assert!(occupancy.peak() <= 3, "peak was {}", occupancy.peak());
        assert!(occupancy.peak() >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nested_pipeline_as_task() {
        init_tracing();
        let inner_batches = stream::iter(vec![
            vec![scripted([(1, "inner-buzz"), (1, "inner-fizz")])],
            vec![scripted([(1, "deep-buzz")])],
        ]);
        let inner = FilterPipeline::new(inner_batches, 1, Regex::new("buzz").unwrap());
        inner.set_concurrency_hint(2);

        let outer_batches = stream::iter(vec![vec![
            Box::new(inner) as Box<dyn Task>,
            scripted([(1, "outer-buzz"), (1, "outer-noise")]),
        ]]);
        let outer = FilterPipeline::new(outer_batches, 2, Regex::new("^(inner|outer)").unwrap());

        let mut results: Vec<String> = outer.start().unwrap().collect().await;
        results.sort();
        assert_eq!(results, vec!["inner-buzz", "outer-buzz", "outer-noise"]);
    }
}
