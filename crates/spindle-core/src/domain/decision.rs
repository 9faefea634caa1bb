//! Decision model: what to do with a task whose attempt just failed.
//!
//! A [`Decider`] is a pure function over the failed record. The engine is the
//! only caller and is responsible for applying the decision.

use std::time::Duration;

use super::TaskRecord;
use crate::queue::RetryPolicy;

/// The next action for a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Requeue the task once `delay` has elapsed.
    Retry { delay: Duration, reason: String },

    /// The failure is terminal.
    GiveUp { reason: String },
}

/// Decides retry vs. give-up for a failed record.
///
/// Implementations must be deterministic and free of side effects.
pub trait Decider: Send + Sync {
    fn decide(&self, record: &TaskRecord) -> Decision;
}

/// Retry while `retry_count < max_retries`, waiting
/// `RetryPolicy::backoff(retry_count)` between attempts.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, record: &TaskRecord) -> Decision {
        if self.retry_policy.can_retry(record) {
            let delay = self.retry_policy.backoff(record.retry_count);
            Decision::Retry {
                delay,
                reason: format!(
                    "retry {}/{} after {:?}",
                    record.retry_count + 1,
                    record.max_retries,
                    delay
                ),
            }
        } else {
            Decision::GiveUp {
                reason: format!(
                    "retries exhausted: {}/{}",
                    record.retry_count, record.max_retries
                ),
            }
        }
    }
}
