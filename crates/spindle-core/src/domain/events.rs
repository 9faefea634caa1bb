//! Task events published on every Task Record transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskRecord;

/// What happened to the record carried by a [`TaskEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    /// Snapshot of a live task, sent once to a new subscriber.
    Replayed,
    Registered,
    Queued,
    Started,
    Progress,
    Completed,
    /// The attempt failed and a retry was scheduled; `Queued` follows.
    AttemptFailed,
    /// The attempt failed and no retry remains.
    Failed,
    Cancelled,
    Expired,
    Unregistered,
}

impl TaskEventKind {
    /// Does this event end the record's lifecycle?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskEventKind::Completed
                | TaskEventKind::Failed
                | TaskEventKind::Cancelled
                | TaskEventKind::Expired
        )
    }
}

/// One transition as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub record: TaskRecord,
    pub at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, record: TaskRecord, at: DateTime<Utc>) -> Self {
        Self { kind, record, at }
    }
}
