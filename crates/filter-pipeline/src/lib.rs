//! # Filter Pipeline
//!
//! This crate provides a fan-out/fan-in execution pipeline with a concurrency bound
//! that can be resized while tasks are running against it.
//!
//! Batches of tasks arrive on an input stream. Every task of a batch runs as its own
//! tokio task once it holds a token from the [`ConcurrencyGate`], and each string it
//! produces is tested against a [`ResultFilter`]. Matching results from all running
//! tasks are merged into a single [`ResultStream`]. Batches are strictly sequential:
//! the next batch is only read once every task of the current one has finished.
//!
//! ## Features
//!
//! - Resizable counting semaphore: growing never blocks, shrinking waits for running
//!   tasks to hand their tokens back
//! - Small hand-off buffer on the output, so a slow consumer stalls the producers
//! - A pipeline is itself a [`Task`] and can be nested inside another pipeline's batch
//!
//! ## Example
//!
//! ```no_run
//! use filter_pipeline::{FilterPipeline, StreamTask, Task, TaskBatch};
//! use futures::stream;
//! use regex::Regex;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> filter_pipeline::Result<()> {
//! let (batches, input) = mpsc::channel::<TaskBatch>(1);
//! let pipeline = FilterPipeline::from_receiver(input, 2, Regex::new(".*buzz$").unwrap());
//! let mut results = pipeline.start()?;
//!
//! tokio::spawn(async move {
//!     let values = stream::iter(vec!["fizz".to_string(), "buzz".to_string()]);
//!     let task: Box<dyn Task> = Box::new(StreamTask::new(values));
//!     let _ = batches.send(vec![task]).await;
//! });
//!
//! while let Some(result) = results.recv().await {
//!     println!("{result}");
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod config;
mod context;
mod dispatcher;
pub mod filter;
pub mod gate;
pub mod pipeline;
pub mod state;
pub mod stream;
pub mod task;

#[cfg(test)]
mod test_utils;

/// Re-export key traits and types
pub use config::PipelineConfig;
pub use filter::{FnFilter, MatchAll, ResultFilter};
pub use gate::{ConcurrencyGate, GateToken, MAX_CONCURRENCY_LIMIT};
pub use pipeline::FilterPipeline;
pub use state::{PipelineState, PipelineStats};
pub use stream::ResultStream;
pub use task::{ResultSequence, StreamTask, Task, TaskBatch};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Common error type for pipeline operations
///
/// An invalid concurrency bound is deliberately absent: it is a contract violation
/// and aborts the caller instead of surfacing here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline was already started")]
    AlreadyStarted,
}
