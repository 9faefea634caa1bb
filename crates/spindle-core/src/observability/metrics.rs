use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::domain::{FetchResult, Priority, TaskEvent, TaskEventKind, TaskKind};
use crate::ports::{EventSink, SinkError};

/// Weight of the newest sample in the smoothed execution time.
pub const EXECUTION_TIME_SMOOTHING: f64 = 0.2;

/// Outcomes of periodic fetch cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchCounts {
    pub new_data: u64,
    pub no_data: u64,
    pub failed: u64,
}

/// Scheduler operational metrics.
///
/// Counters are derived from task events, one O(1) update per event. The
/// gauges (`active_tasks`, `queued_tasks`, `registered_tasks`) are filled in
/// from live state when a snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerMetrics {
    pub registered: u64,
    pub started: u64,
    pub completed: u64,
    /// Terminal failures only; failed attempts that were retried count as `retried`.
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub expired: u64,

    /// Started attempts per task kind.
    pub started_by_kind: BTreeMap<TaskKind, u64>,
    /// Started attempts per priority.
    pub started_by_priority: BTreeMap<Priority, u64>,

    /// `completed / (completed + failed + cancelled)`, 0 when nothing finished.
    pub success_rate: f64,

    /// Exponentially smoothed duration of finished attempts.
    pub average_execution_time: Option<Duration>,

    pub fetches: FetchCounts,

    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub registered_tasks: usize,
}

impl SchedulerMetrics {
    pub fn record(&mut self, event: &TaskEvent) {
        let record = &event.record;
        match event.kind {
            TaskEventKind::Registered => self.registered += 1,
            TaskEventKind::Started => {
                self.started += 1;
                *self.started_by_kind.entry(record.kind).or_default() += 1;
                *self.started_by_priority.entry(record.priority).or_default() += 1;
            }
            TaskEventKind::Completed => {
                self.completed += 1;
                self.observe_duration(record.execution_duration);
                self.update_success_rate();
            }
            TaskEventKind::AttemptFailed => {
                self.retried += 1;
                self.observe_duration(record.execution_duration);
            }
            TaskEventKind::Failed => {
                self.failed += 1;
                self.observe_duration(record.execution_duration);
                self.update_success_rate();
            }
            TaskEventKind::Cancelled => {
                self.cancelled += 1;
                self.update_success_rate();
            }
            TaskEventKind::Expired => self.expired += 1,
            TaskEventKind::Replayed
            | TaskEventKind::Queued
            | TaskEventKind::Progress
            | TaskEventKind::Unregistered => {}
        }
    }

    pub fn record_fetch(&mut self, result: FetchResult) {
        match result {
            FetchResult::NewData => self.fetches.new_data += 1,
            FetchResult::NoData => self.fetches.no_data += 1,
            FetchResult::Failed => self.fetches.failed += 1,
        }
    }

    fn observe_duration(&mut self, sample: Option<Duration>) {
        let Some(sample) = sample else {
            return;
        };
        // EMA: avg = avg * (1 - a) + sample * a
        let next = match self.average_execution_time {
            None => sample,
            Some(prev) => {
                let prev = prev.as_secs_f64();
                let cur = sample.as_secs_f64();
                Duration::from_secs_f64(
                    prev * (1.0 - EXECUTION_TIME_SMOOTHING) + cur * EXECUTION_TIME_SMOOTHING,
                )
            }
        };
        self.average_execution_time = Some(next);
    }

    fn update_success_rate(&mut self) {
        let finished = self.completed + self.failed + self.cancelled;
        self.success_rate = if finished == 0 {
            0.0
        } else {
            self.completed as f64 / finished as f64
        };
    }
}

/// Event sink that folds every event into [`SchedulerMetrics`].
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: Mutex<SchedulerMetrics>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SchedulerMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record_fetch(&self, result: FetchResult) {
        match self.metrics.lock() {
            Ok(mut metrics) => metrics.record_fetch(result),
            Err(_) => tracing::warn!(%result, "metrics lock poisoned; fetch outcome dropped"),
        }
    }
}

impl EventSink for MetricsAggregator {
    fn emit(&self, event: &TaskEvent) -> Result<(), SinkError> {
        let mut metrics = self
            .metrics
            .lock()
            .map_err(|_| SinkError("metrics lock poisoned".into()))?;
        metrics.record(event);
        Ok(())
    }
}
