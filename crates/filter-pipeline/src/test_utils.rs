use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::task::{ResultSequence, Task};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

/// Task emitting each result after its delay in milliseconds.
pub struct ScriptedTask {
    steps: Vec<(u64, String)>,
}

impl Task for ScriptedTask {
    fn start(self: Box<Self>) -> ResultSequence {
        stream::iter(self.steps)
            .then(|(delay_ms, result)| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                result
            })
            .boxed()
    }
}

pub fn scripted<'a>(steps: impl IntoIterator<Item = (u64, &'a str)>) -> Box<dyn Task> {
    Box::new(ScriptedTask {
        steps: steps
            .into_iter()
            .map(|(delay_ms, result)| (delay_ms, result.to_string()))
            .collect(),
    })
}

/// Counts how many occupying tasks are inside their sequence at the same time.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Occupancy {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Task that holds its slot for `hold_ms` and then yields `result`.
pub fn occupying(occupancy: &Occupancy, hold_ms: u64, result: &str) -> Box<dyn Task> {
    let occupancy = occupancy.clone();
    let result = result.to_string();
    Box::new(crate::task::StreamTask::new(stream::once(async move {
        let now = occupancy.running.fetch_add(1, Ordering::SeqCst) + 1;
        occupancy.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(hold_ms)).await;
        occupancy.running.fetch_sub(1, Ordering::SeqCst);
        result
    })))
}
