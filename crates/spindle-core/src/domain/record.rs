//! Task record: the per-version value describing one execution of a task.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Priority, TaskId, TaskKind, TaskRequest, TaskStatus};

/// Snapshot of one unit of deferred work and where it is in its lifecycle.
///
/// Design:
/// - This is the single source of truth for a task run's state.
/// - Only the execution engine mutates it; callers only ever see clones.
/// - Each execution of a definition after a terminal outcome is a new
///   record with a higher `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub identifier: TaskId,
    pub kind: TaskKind,
    pub priority: Priority,
    pub status: TaskStatus,

    /// 1-based execution number of the owning definition.
    pub run: u64,

    /// Creation order across all records; breaks ties between equal
    /// priorities and creation instants.
    pub sequence: u64,

    pub created_at: DateTime<Utc>,

    /// Earliest instant the task may begin.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,

    /// Set while a failed attempt waits out its backoff.
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub retry_count: u32,
    pub max_retries: u32,

    /// Advisory, in [0, 1].
    pub progress: f64,

    pub last_error: Option<String>,

    /// Wall time of the most recent attempt.
    pub execution_duration: Option<Duration>,

    pub metadata: BTreeMap<String, String>,
}

impl TaskRecord {
    pub(crate) fn new(
        request: &TaskRequest,
        max_retries: u32,
        run: u64,
        sequence: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: request.identifier.clone(),
            kind: request.kind,
            priority: request.priority,
            status: TaskStatus::Scheduled,
            run,
            sequence,
            created_at: now,
            scheduled_at: request.constraints.earliest_begin,
            started_at: None,
            completed_at: None,
            expires_at: request.constraints.expires_at,
            next_attempt_at: None,
            retry_count: 0,
            max_retries,
            progress: 0.0,
            last_error: None,
            execution_duration: None,
            metadata: request.metadata.clone(),
        }
    }

    /// Has the expiration instant been reached?
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Earliest instant this record may be admitted, if it is deferred at all.
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at.or(self.scheduled_at)
    }

    /// May this record be admitted at `now`?
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.not_before().is_none_or(|at| at <= now)
    }

    pub(crate) fn mark_queued(&mut self) {
        self.status = TaskStatus::Queued;
    }

    pub(crate) fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.completed_at = None;
        self.next_attempt_at = None;
        self.progress = 0.0;
    }

    pub(crate) fn mark_completed(&mut self, now: DateTime<Utc>, elapsed: Duration) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.progress = 1.0;
        self.execution_duration = Some(elapsed);
    }

    pub(crate) fn mark_failed(&mut self, now: DateTime<Utc>, error: String, elapsed: Duration) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.last_error = Some(error);
        self.execution_duration = Some(elapsed);
    }

    /// Record an approved retry. The record stays `Failed` until
    /// [`requeue`](Self::requeue) so observers see the failed attempt first.
    pub(crate) fn schedule_retry(&mut self, next_attempt_at: DateTime<Utc>) {
        self.retry_count += 1;
        self.next_attempt_at = Some(next_attempt_at);
    }

    /// Move from a retryable failure back to `Queued`.
    pub(crate) fn requeue(&mut self) {
        self.status = TaskStatus::Queued;
    }

    pub(crate) fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(now);
        self.next_attempt_at = None;
    }

    pub(crate) fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Expired;
        self.completed_at = Some(now);
        self.next_attempt_at = None;
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress = if progress.is_nan() {
            self.progress
        } else {
            progress.clamp(0.0, 1.0)
        };
    }
}
