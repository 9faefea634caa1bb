//! The single owner of all mutable scheduler state.
//!
//! Every method is synchronous and is called with the scheduler lock held,
//! so transitions are applied one at a time and events are published in the
//! order the transitions happened. Nothing here awaits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{MAX_RETRIES_LIMIT, SchedulerConfig};
use crate::domain::{Decider, Decision, TaskEvent, TaskEventKind, TaskId, TaskKind, TaskRecord, TaskRequest};
use crate::error::SchedulerError;
use crate::lifecycle::Lifecycle;
use crate::observability::{EventChannel, TaskEvents};
use crate::ports::{SchedulingHint, clock::offset};
use crate::queue::{AdmissionQueue, TaskHistory};
use crate::registry::{RegisteredTask, TaskRegistry, WorkFunction};

/// An admitted task whose work function must now be spawned.
pub(crate) struct Launch {
    pub(crate) identifier: TaskId,
    pub(crate) token: u64,
    pub(crate) work: Arc<dyn WorkFunction>,
}

/// What `request_execution` did with the task.
pub(crate) enum Execution {
    /// Admitted inline; the caller spawns the launch.
    Started(Launch),
    Queued,
    /// Already pending, or expired on the spot.
    Unchanged,
}

struct ActiveEntry {
    record: TaskRecord,
    /// Identifies this admission; completions carrying another token are stale.
    token: u64,
}

pub(crate) struct SchedulerState {
    pub(crate) lifecycle: Lifecycle,
    registry: TaskRegistry,
    queue: AdmissionQueue,
    active: HashMap<TaskId, ActiveEntry>,
    history: TaskHistory,
    channel: EventChannel,
    decider: Arc<dyn Decider>,
    max_concurrent: usize,
    default_max_retries: u32,
    scheduling_enabled: bool,
    next_sequence: u64,
    next_token: u64,
}

impl SchedulerState {
    pub(crate) fn new(
        config: &SchedulerConfig,
        decider: Arc<dyn Decider>,
        channel: EventChannel,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            registry: TaskRegistry::new(),
            queue: AdmissionQueue::new(),
            active: HashMap::new(),
            history: TaskHistory::new(config.history_limit),
            channel,
            decider,
            max_concurrent: config.max_concurrent_tasks,
            default_max_retries: config.default_max_retries,
            scheduling_enabled: config.scheduling_enabled,
            next_sequence: 0,
            next_token: 0,
        }
    }

    fn emit(&mut self, kind: TaskEventKind, record: &TaskRecord, now: DateTime<Utc>) {
        debug!(
            task = %record.identifier,
            run = record.run,
            status = %record.status,
            event = ?kind,
            "task transition"
        );
        self.channel.publish(TaskEvent::new(kind, record.clone(), now));
    }

    fn sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    // ── registry ────────────────────────────────────────────────────────────

    /// Store a definition and its first record. Returns the platform hint to
    /// forward, if the request carries platform-relevant constraints.
    pub(crate) fn register(
        &mut self,
        request: TaskRequest,
        work: Option<Arc<dyn WorkFunction>>,
        now: DateTime<Utc>,
    ) -> Result<Option<SchedulingHint>, SchedulerError> {
        self.lifecycle.ensure_available()?;
        if !self.scheduling_enabled {
            return Err(SchedulerError::SchedulingDisabled);
        }
        if request.identifier.is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "task identifier must not be blank".into(),
            ));
        }
        let max_retries = request.max_retries.unwrap_or(self.default_max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(SchedulerError::InvalidRequest(format!(
                "max_retries {max_retries} exceeds limit {MAX_RETRIES_LIMIT}"
            )));
        }

        let sequence = self.sequence();
        let definition = self.registry.insert(request, max_retries, work)?;
        let record = definition.next_record(sequence, now);
        let hint = SchedulingHint::for_request(&definition.request);
        definition.hinted = hint.is_some();
        definition.idle = Some(record.clone());

        info!(task = %record.identifier, kind = %record.kind, priority = %record.priority, "task registered");
        self.emit(TaskEventKind::Registered, &record, now);
        Ok(hint)
    }

    pub(crate) fn bind(
        &mut self,
        identifier: &TaskId,
        work: Arc<dyn WorkFunction>,
    ) -> Result<(), SchedulerError> {
        self.lifecycle.ensure_available()?;
        self.registry.bind(identifier, work)?;
        debug!(task = %identifier, "work function bound");
        Ok(())
    }

    /// Remove a definition, cancelling its live record. Returns whether a
    /// platform hint was submitted for it, or `None` for unknown identifiers.
    pub(crate) fn unregister(&mut self, identifier: &TaskId, now: DateTime<Utc>) -> Option<bool> {
        let definition = self.registry.remove(identifier)?;
        let cancelled = self.cancel_pending(identifier, now);

        let record = definition
            .idle
            .or(cancelled)
            .or_else(|| self.history.latest(identifier).cloned())
            .unwrap_or_else(|| {
                TaskRecord::new(&definition.request, definition.max_retries, definition.runs, 0, now)
            });
        info!(task = %identifier, "task unregistered");
        self.emit(TaskEventKind::Unregistered, &record, now);
        Some(definition.hinted)
    }

    pub(crate) fn set_scheduling_enabled(&mut self, enabled: bool) {
        self.scheduling_enabled = enabled;
        info!(enabled, "scheduling gate changed");
    }

    pub(crate) fn scheduling_enabled(&self) -> bool {
        self.scheduling_enabled
    }

    // ── execution ───────────────────────────────────────────────────────────

    /// Admit the task's current record, or queue it when no slot is free.
    ///
    /// A record that is already queued or running is left alone. After a
    /// terminal outcome, a new record (the next run) is created. A record is
    /// admitted inline only if it is eligible and no eligible queued record
    /// would be admitted before it.
    pub(crate) fn request_execution(
        &mut self,
        identifier: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<Execution, SchedulerError> {
        self.lifecycle.ensure_available()?;
        let sequence = self.sequence();
        let definition = self
            .registry
            .get_mut(identifier)
            .ok_or_else(|| SchedulerError::TaskNotFound(identifier.clone()))?;
        let work = definition
            .work()
            .ok_or_else(|| SchedulerError::HandlerNotFound(identifier.clone()))?;
        if self.queue.contains(identifier) || self.active.contains_key(identifier) {
            debug!(task = %identifier, "execution already pending");
            return Ok(Execution::Unchanged);
        }

        let mut record = match definition.idle.take() {
            Some(record) => record,
            None => definition.next_record(sequence, now),
        };
        if record.is_expired(now) {
            self.expire(record, now);
            return Ok(Execution::Unchanged);
        }
        if self.active.len() < self.max_concurrent
            && record.is_eligible(now)
            && !self.queue.has_eligible_ahead_of(&record, now)
        {
            return Ok(Execution::Started(self.admit(record, work, now)));
        }
        record.mark_queued();
        self.emit(TaskEventKind::Queued, &record, now);
        self.queue.push(record);
        Ok(Execution::Queued)
    }

    /// Move `record` into the active set and hand back what must be spawned.
    fn admit(
        &mut self,
        mut record: TaskRecord,
        work: Arc<dyn WorkFunction>,
        now: DateTime<Utc>,
    ) -> Launch {
        record.start_attempt(now);
        let token = self.next_token;
        self.next_token += 1;
        self.emit(TaskEventKind::Started, &record, now);

        let identifier = record.identifier.clone();
        self.active.insert(identifier.clone(), ActiveEntry { record, token });
        Launch {
            identifier,
            token,
            work,
        }
    }

    /// One drain cycle: admit eligible queued records, highest priority
    /// first, until the queue is exhausted or the ceiling is reached.
    pub(crate) fn drain(&mut self, now: DateTime<Utc>) -> Vec<Launch> {
        if !self.lifecycle.is_available() {
            return Vec::new();
        }

        let expired: Vec<TaskId> = self
            .queue
            .iter()
            .filter(|r| r.is_expired(now))
            .map(|r| r.identifier.clone())
            .collect();
        for identifier in expired {
            if let Some(record) = self.queue.remove(&identifier) {
                self.expire(record, now);
            }
        }

        let mut launches = Vec::new();
        while self.active.len() < self.max_concurrent {
            let Some(mut record) = self.queue.pop_eligible(now) else {
                break;
            };
            let Some(work) = self.registry.get(&record.identifier).and_then(|d| d.work()) else {
                // Definitions are removed together with their queued records,
                // so this only happens if the invariant was broken.
                warn!(task = %record.identifier, "queued task has no work function");
                record.mark_cancelled(now);
                self.emit(TaskEventKind::Cancelled, &record, now);
                self.history.push(record);
                continue;
            };

            launches.push(self.admit(record, work, now));
        }
        launches
    }

    /// Apply a finished attempt. Returns `false` for stale completions, whose
    /// task was cancelled (or the scheduler deactivated) while it ran.
    pub(crate) fn complete(
        &mut self,
        identifier: &TaskId,
        token: u64,
        outcome: Result<(), String>,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        match self.active.get(identifier) {
            Some(entry) if entry.token == token => {}
            _ => {
                debug!(task = %identifier, token, "stale completion ignored");
                return false;
            }
        }
        let Some(ActiveEntry { mut record, .. }) = self.active.remove(identifier) else {
            return false;
        };

        let error = match outcome {
            Ok(()) => {
                record.mark_completed(now, elapsed);
                debug!(task = %identifier, ?elapsed, "task completed");
                self.emit(TaskEventKind::Completed, &record, now);
                self.history.push(record);
                return true;
            }
            Err(error) => error,
        };

        record.mark_failed(now, error, elapsed);
        match self.decider.decide(&record) {
            Decision::Retry { delay, reason } => {
                let next_attempt_at = offset(now, delay);
                if record.is_expired(next_attempt_at) {
                    self.expire(record, now);
                    return true;
                }
                record.schedule_retry(next_attempt_at);
                debug!(task = %identifier, %reason, "attempt failed; retry scheduled");
                self.emit(TaskEventKind::AttemptFailed, &record, now);
                record.requeue();
                self.emit(TaskEventKind::Queued, &record, now);
                self.queue.push(record);
            }
            Decision::GiveUp { reason } => {
                warn!(
                    task = %identifier,
                    error = record.last_error.as_deref().unwrap_or_default(),
                    %reason,
                    "task failed"
                );
                self.emit(TaskEventKind::Failed, &record, now);
                self.history.push(record);
            }
        }
        true
    }

    /// Cancel the task's live record. Returns `true` if a running record
    /// was removed, freeing a slot.
    pub(crate) fn cancel(
        &mut self,
        identifier: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        self.lifecycle.ensure_available()?;
        if !self.registry.contains(identifier) {
            return Err(SchedulerError::TaskNotFound(identifier.clone()));
        }
        let was_running = self.active.contains_key(identifier);
        let idle = self
            .registry
            .get_mut(identifier)
            .and_then(|definition| definition.idle.take());
        match idle {
            Some(mut record) => {
                record.mark_cancelled(now);
                self.emit(TaskEventKind::Cancelled, &record, now);
                self.history.push(record);
            }
            None => {
                if self.cancel_pending(identifier, now).is_none() {
                    debug!(task = %identifier, "nothing to cancel");
                }
            }
        }
        Ok(was_running)
    }

    /// Cancel a queued or running record of `identifier`.
    fn cancel_pending(&mut self, identifier: &TaskId, now: DateTime<Utc>) -> Option<TaskRecord> {
        let mut record = match self.queue.remove(identifier) {
            Some(record) => record,
            None => self.active.remove(identifier)?.record,
        };
        record.mark_cancelled(now);
        info!(task = %identifier, run = record.run, "task cancelled");
        self.emit(TaskEventKind::Cancelled, &record, now);
        self.history.push(record.clone());
        Some(record)
    }

    fn expire(&mut self, mut record: TaskRecord, now: DateTime<Utc>) {
        record.mark_expired(now);
        info!(task = %record.identifier, run = record.run, "task expired");
        self.emit(TaskEventKind::Expired, &record, now);
        self.history.push(record);
    }

    pub(crate) fn report_progress(
        &mut self,
        identifier: &TaskId,
        progress: f64,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if !self.registry.contains(identifier) {
            return Err(SchedulerError::TaskNotFound(identifier.clone()));
        }
        let Some(entry) = self.active.get_mut(identifier) else {
            return Err(SchedulerError::InvalidRequest(format!(
                "task {identifier} is not running"
            )));
        };
        entry.record.set_progress(progress);
        let record = entry.record.clone();
        self.emit(TaskEventKind::Progress, &record, now);
        Ok(())
    }

    /// Cancel everything queued or running and close the event channel.
    /// Idle registrations survive for the next activation.
    pub(crate) fn shutdown(&mut self, now: DateTime<Utc>) {
        let queued = self.queue.drain();
        let mut running: Vec<TaskRecord> = self.active.drain().map(|(_, e)| e.record).collect();
        running.sort_by_key(|r| r.sequence);

        for mut record in running.into_iter().chain(queued) {
            record.mark_cancelled(now);
            self.emit(TaskEventKind::Cancelled, &record, now);
            self.history.push(record);
        }
        self.channel.close();
    }

    pub(crate) fn reopen_events(&mut self) {
        self.channel.reopen();
    }

    /// When the pump must wake up on its own: the earliest deferred record,
    /// if a slot is free to admit it.
    pub(crate) fn next_wake(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.lifecycle.is_available() || self.active.len() >= self.max_concurrent {
            return None;
        }
        self.queue.next_eligible_at(now)
    }

    // ── observation ─────────────────────────────────────────────────────────

    /// Subscribe, replaying a snapshot of every live record.
    pub(crate) fn subscribe(&mut self, now: DateTime<Utc>) -> TaskEvents {
        let replay = self
            .live_records()
            .into_iter()
            .map(|record| TaskEvent::new(TaskEventKind::Replayed, record, now))
            .collect();
        self.channel.subscribe(replay)
    }

    /// Running, then queued in admission order, then idle by creation.
    fn live_records(&self) -> Vec<TaskRecord> {
        let mut idle: Vec<_> = self.registry.idle_records().cloned().collect();
        idle.sort_by_key(|r| r.sequence);
        let mut live = self.active_tasks();
        live.extend(self.queued_tasks());
        live.extend(idle);
        live
    }

    pub(crate) fn registered_tasks(&self) -> Vec<RegisteredTask> {
        self.registry.summaries()
    }

    pub(crate) fn queued_tasks(&self) -> Vec<TaskRecord> {
        self.queue.iter().cloned().collect()
    }

    pub(crate) fn active_tasks(&self) -> Vec<TaskRecord> {
        let mut active: Vec<_> = self.active.values().map(|e| e.record.clone()).collect();
        active.sort_by_key(|r| r.sequence);
        active
    }

    pub(crate) fn history(&self, since: Option<DateTime<Utc>>) -> Vec<TaskRecord> {
        self.history.since(since)
    }

    /// Current record of `identifier`: idle, queued, running, or else its
    /// most recent terminal record.
    pub(crate) fn task(&self, identifier: &TaskId) -> Option<TaskRecord> {
        self.registry
            .get(identifier)
            .and_then(|d| d.idle.as_ref())
            .or_else(|| self.queue.get(identifier))
            .or_else(|| self.active.get(identifier).map(|e| &e.record))
            .or_else(|| self.history.latest(identifier))
            .cloned()
    }

    pub(crate) fn bound_fetch_tasks(&self) -> Vec<TaskId> {
        self.registry.bound_of_kind(TaskKind::Fetch)
    }

    /// `(active, queued, registered)`
    pub(crate) fn gauges(&self) -> (usize, usize, usize) {
        (self.active.len(), self.queue.len(), self.registry.len())
    }
}
