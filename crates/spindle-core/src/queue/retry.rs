//! Retry policy: decides backoff delays.

use std::time::Duration;

use crate::domain::{TaskRecord, TaskStatus};

/// Exponential backoff for failed tasks.
///
/// `backoff(n) = base_delay * multiplier^n`, capped at `max_delay`.
/// Integer arithmetic keeps the delays exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    pub multiplier: u32,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60 * 60);

    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait before the next attempt, given how many retries already happened.
    ///
    /// Example with base_delay=1s, multiplier=2:
    /// - retry_count 0 (first failure): 1s
    /// - retry_count 1: 2s
    /// - retry_count 2: 4s
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = self.multiplier.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A record may retry while it is failed and has budget left.
    pub fn can_retry(&self, record: &TaskRecord) -> bool {
        record.status == TaskStatus::Failed && record.retry_count < record.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
