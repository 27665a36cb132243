//! # Batch Dispatcher
//!
//! Reads batches from the input stream one at a time. Every task of a batch is
//! spawned as its own execution; an execution takes a gate token, runs the task's
//! result sequence through the filter and pushes matches onto the shared output.
//! The dispatcher joins the whole batch before it reads the next one, so batches
//! never overlap while tasks inside a batch run in any order.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::context::ExecutionContext;
use crate::state::{PipelineState, StatsCounters};
use crate::task::{Task, TaskBatch};

/// Drive the pipeline until the input is exhausted, then close the output.
///
/// `results` is the only sender kept outside of running executions, so the output
/// closes exactly when this returns and the last batch has been joined.
pub(crate) async fn run<S>(
    mut batches: S,
    context: Arc<ExecutionContext>,
    results: mpsc::Sender<String>,
) where
    S: Stream<Item = TaskBatch> + Unpin,
{
    context.advance(PipelineState::Running);
    info!(limit = context.gate.limit(), "Pipeline started");

    while let Some(batch) = batches.next().await {
        let batch_index = StatsCounters::bump(&context.stats.batches_dispatched);
        dispatch_batch(batch_index, batch, &context, &results).await;

        if context.progress_log_interval > 0 && batch_index % context.progress_log_interval == 0 {
            let stats = context.stats.snapshot();
            debug!(
                batches = stats.batches_dispatched,
                tasks = stats.tasks_completed,
                matched = stats.results_matched,
                limit = context.gate.limit(),
                "Pipeline progress"
            );
        }

        if results.is_closed() {
            warn!(
                batch = batch_index,
                "Result consumer dropped, no further batches will be read"
            );
            break;
        }
    }

    context.advance(PipelineState::Draining);
    drop(results);
    context.advance(PipelineState::Closed);

    let stats = context.stats.snapshot();
    info!(
        batches = stats.batches_dispatched,
        tasks = stats.tasks_completed,
        panicked = stats.tasks_panicked,
        produced = stats.results_produced,
        matched = stats.results_matched,
        "Pipeline closed"
    );
}

/// Fan a batch out over the gate and wait for every execution to finish.
async fn dispatch_batch(
    batch_index: u64,
    batch: TaskBatch,
    context: &Arc<ExecutionContext>,
    results: &mpsc::Sender<String>,
) {
    let task_count = batch.len();
    debug!(batch = batch_index, tasks = task_count, "Dispatching batch");

    let mut executions = JoinSet::new();
    for task in batch {
        executions.spawn(execute(task, context.clone(), results.clone()));
    }

    while let Some(outcome) = executions.join_next().await {
        if let Err(join_error) = outcome {
            if join_error.is_panic() {
                StatsCounters::bump(&context.stats.tasks_panicked);
                error!(batch = batch_index, error = ?join_error, "Task execution panicked");
            } else {
                warn!(batch = batch_index, error = ?join_error, "Task execution aborted");
            }
        }
    }

    debug!(batch = batch_index, tasks = task_count, "Batch completed");
}

/// Run one task under a gate token.
///
/// The token is held until the task's sequence is exhausted; a slow consumer keeps
/// it held through the blocked send. Once the consumer is gone the task still runs
/// to completion, its matches are just no longer forwarded.
async fn execute(
    task: Box<dyn Task>,
    context: Arc<ExecutionContext>,
    results: mpsc::Sender<String>,
) {
    let token = context.gate.acquire().await;
    StatsCounters::bump(&context.stats.tasks_started);

    let mut sequence = task.start();
    let mut forwarding = true;

    while let Some(result) = sequence.next().await {
        StatsCounters::bump(&context.stats.results_produced);

        if !context.filter.matches(&result) {
            trace!(result = %result, "Result filtered out");
            continue;
        }
        StatsCounters::bump(&context.stats.results_matched);

        if !forwarding {
            continue;
        }
        if results.send(result).await.is_err() {
            debug!("Result consumer is gone, draining task without forwarding");
            forwarding = false;
        } else {
            StatsCounters::bump(&context.stats.results_delivered);
        }
    }

    token.release();
    StatsCounters::bump(&context.stats.tasks_completed);
}
