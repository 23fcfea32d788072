use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a solve stopped before meeting its tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    DeadlineReached,
    IterationBudget,
}

/// Caller-side limits on a solve.
///
/// Running out of budget is not an error: the solver returns its best
/// feasible iterate marked as partial. The configured `max_iterations` is a
/// separate hard cap and exhausting it counts as divergence.
#[derive(Debug, Clone, Default)]
pub struct SolveBudget {
    deadline: Option<Instant>,
    max_iterations: Option<usize>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SolveBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    /// Stops the solve as soon as `flag` is set from another thread.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Checked once per iteration, before the iteration runs.
    pub(crate) fn check(&self, iteration: usize) -> Option<StopReason> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Some(StopReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(StopReason::DeadlineReached);
        }
        if self.max_iterations.is_some_and(|cap| iteration >= cap) {
            return Some(StopReason::IterationBudget);
        }
        None
    }
}
