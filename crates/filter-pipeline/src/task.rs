//! Units of work executed by the pipeline.

use futures::Stream;
use futures::stream::{BoxStream, StreamExt};

/// Lazy, finite sequence of results produced by a started task.
pub type ResultSequence = BoxStream<'static, String>;

/// Group of tasks that must all finish before the next batch is dispatched.
///
/// No order is implied between the tasks of one batch.
pub type TaskBatch = Vec<Box<dyn Task>>;

/// A unit of work that produces string results.
///
/// `start` consumes the task, so a result sequence can only ever be obtained once.
/// A task that wants to report a failure has to encode it as a result value; the
/// pipeline only learns that a task is done when its sequence ends.
pub trait Task: Send + 'static {
    /// Start the task and hand back its result sequence.
    fn start(self: Box<Self>) -> ResultSequence;

    /// Suggest a concurrency level for work the task runs internally.
    ///
    /// What this means is up to the task; the default ignores it.
    fn set_concurrency_hint(&self, _level: u8) {}
}

/// Adapts any stream of strings into a [`Task`].
pub struct StreamTask<S> {
    results: S,
}

impl<S> StreamTask<S>
where
    S: Stream<Item = String> + Send + 'static,
{
    pub fn new(results: S) -> Self {
        Self { results }
    }
}

impl<S> std::fmt::Debug for StreamTask<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTask").finish_non_exhaustive()
    }
}

impl<S> Task for StreamTask<S>
where
    S: Stream<Item = String> + Send + 'static,
{
    fn start(self: Box<Self>) -> ResultSequence {
        self.results.boxed()
    }
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Task")
    }
}
