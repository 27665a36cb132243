//! # Concurrency Gate
//!
//! A counting semaphore whose size can be changed while tokens are loaned out.
//!
//! Growing the gate adds fresh tokens and returns immediately. Shrinking it takes the
//! surplus tokens out of the pool, which means waiting until running tasks hand enough
//! of them back: running tasks are never preempted, new ones simply cannot start until
//! the surplus has drained. Resizes are serialized by a mutex so the bookkeeping of the
//! current bound never sees interleaved grows and shrinks.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Largest bound the gate can be sized to.
pub const MAX_CONCURRENCY_LIMIT: u8 = u8::MAX;

/// Abort the caller on a bound the gate cannot honor.
///
/// A zero bound would stall every task forever, and asking for one is a programming
/// error rather than a runtime condition, so there is no recoverable path.
#[track_caller]
pub(crate) fn assert_valid_limit(limit: u8) {
    if limit < 1 {
        panic!("such a concurrency limit is not allowed: {limit} (must be at least 1)");
    }
}

/// Resizable token pool bounding the number of concurrently running tasks.
#[derive(Debug)]
pub struct ConcurrencyGate {
    /// Token pool.
    permits: Arc<Semaphore>,
    /// Current bound; the lock serializes resizes.
    limit: Mutex<u8>,
    /// Mirror of `limit` for lock-free reads.
    current: AtomicU8,
}

/// A token held by one running task.
///
/// Dropping the token returns it to the gate, so every exit path of an execution
/// releases exactly once.
#[derive(Debug)]
#[must_use = "dropping the token releases it immediately"]
pub struct GateToken {
    _permit: OwnedSemaphorePermit,
}

impl GateToken {
    /// Return the token to the gate.
    pub fn release(self) {
        drop(self);
    }
}

impl ConcurrencyGate {
    /// Create a gate primed with `limit` tokens.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    #[track_caller]
    pub fn new(limit: u8) -> Self {
        assert_valid_limit(limit);
        Self {
            permits: Arc::new(Semaphore::new(usize::from(limit))),
            limit: Mutex::new(limit),
            current: AtomicU8::new(limit),
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) -> GateToken {
        match self.permits.clone().acquire_owned().await {
            Ok(permit) => GateToken { _permit: permit },
            Err(_) => unreachable!("the token pool is never closed"),
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> Option<GateToken> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GateToken { _permit: permit })
    }

    /// Change the bound to `new_limit`.
    ///
    /// Growing returns without waiting. Shrinking waits until `current - new_limit`
    /// tokens have been returned by running tasks and retires them. Concurrent calls
    /// are applied one at a time. [`limit`](Self::limit) reports the new bound only
    /// once the resize has completed.
    ///
    /// # Panics
    ///
    /// Panics if `new_limit` is 0.
    #[track_caller]
    pub fn resize(&self, new_limit: u8) -> impl Future<Output = ()> + Send + '_ {
        assert_valid_limit(new_limit);
        self.resize_inner(new_limit)
    }

    async fn resize_inner(&self, new_limit: u8) {
        let mut limit = self.limit.lock().await;
        let old_limit = *limit;

        match new_limit.cmp(&old_limit) {
            CmpOrdering::Greater => {
                self.permits.add_permits(usize::from(new_limit - old_limit));
            }
            CmpOrdering::Less => {
                let surplus = u32::from(old_limit - new_limit);
                debug!(
                    from = old_limit,
                    to = new_limit,
                    surplus,
                    "Waiting for surplus tokens"
                );
                match self.permits.acquire_many(surplus).await {
                    Ok(retired) => retired.forget(),
                    Err(_) => unreachable!("the token pool is never closed"),
                }
            }
            CmpOrdering::Equal => return,
        }

        *limit = new_limit;
        self.current.store(new_limit, Ordering::Release);
        debug!(from = old_limit, to = new_limit, "Concurrency gate resized");
    }

    /// The bound currently in effect.
    pub fn limit(&self) -> u8 {
        self.current.load(Ordering::Acquire)
    }

    /// Number of tokens that could be taken right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
