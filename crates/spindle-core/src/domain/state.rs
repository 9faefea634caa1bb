//! Task status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a Task Record.
///
/// State transitions:
/// - Scheduled -> Queued -> Running -> Completed
/// - Running -> Failed -> Queued (retry, while retry_count < max_retries)
/// - Running -> Failed (retries exhausted)
/// - Scheduled | Queued | Running -> Cancelled
/// - Scheduled | Queued -> Expired (detected at admission)
///
/// A record only rests in `Failed` once it is terminal; the retry path moves
/// it back to `Queued` within the same transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Registered, not yet requested for execution.
    Scheduled,

    /// Waiting in the admission queue for a slot.
    Queued,

    /// Work function invoked and not yet finished.
    Running,

    Completed,

    Failed,

    Cancelled,

    /// Expiration time passed before the task could run.
    Expired,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Expired
        )
    }

    /// Is this record still owned by the registry, the queue or the active set?
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Scheduled, false)]
    #[case(TaskStatus::Queued, false)]
    #[case(TaskStatus::Running, false)]
    #[case(TaskStatus::Completed, true)]
    #[case(TaskStatus::Failed, true)]
    #[case(TaskStatus::Cancelled, true)]
    #[case(TaskStatus::Expired, true)]
    fn terminal_states(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_live(), !terminal);
    }
}
