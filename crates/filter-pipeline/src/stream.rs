//! Consumer side of the merged, filtered output.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

/// Merged output of every task the pipeline runs.
///
/// Yields `None` once the input is exhausted and every dispatched batch has drained.
/// Results of different tasks arrive interleaved in whatever order they were produced;
/// results of a single task keep that task's order.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::Receiver<String>,
}

impl ResultStream {
    pub(crate) fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Receive the next matching result.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for ResultStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
