//! Retry and polling budgets for the retry controller.

use std::time::Duration;

/// Fixed-cadence poll budget for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub iterations: u32,
}

impl PollBudget {
    /// Upper bound on how long one attempt waits for the executor.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.iterations
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            iterations: 40,
        }
    }
}

/// Bounds for one task: `max_retries + 1` attempts, each with its own poll budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub poll: PollBudget,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// True when an attempt with this index may be followed by another one.
    pub fn has_attempt_after(&self, index: u32) -> bool {
        index.saturating_add(1) < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            poll: PollBudget::default(),
        }
    }
}
