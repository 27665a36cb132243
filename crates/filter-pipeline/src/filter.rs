//! Predicates deciding which task results reach the output.

use regex::Regex;

/// Decides whether a produced result is forwarded to the output.
///
/// Called once per result from many executions at the same time, so implementations
/// must be cheap and side-effect free.
pub trait ResultFilter: Send + Sync + 'static {
    fn matches(&self, result: &str) -> bool;
}

impl ResultFilter for Regex {
    fn matches(&self, result: &str) -> bool {
        self.is_match(result)
    }
}

/// Filter backed by a closure.
pub struct FnFilter<F>(F);

impl<F> FnFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    pub fn new(predicate: F) -> Self {
        Self(predicate)
    }
}

impl<F> std::fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FnFilter").finish_non_exhaustive()
    }
}

impl<F> ResultFilter for FnFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    fn matches(&self, result: &str) -> bool {
        (self.0)(result)
    }
}

/// Forwards every result.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl ResultFilter for MatchAll {
    fn matches(&self, _result: &str) -> bool {
        true
    }
}
