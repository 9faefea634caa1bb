//! Scheduler: the execution engine and its public API.
//!
//! # Structure
//! - `state`: the single owner of registry, admission queue, active set and
//!   history. Guarded by one `std::sync::Mutex` that is never held across an
//!   await.
//! - `pump`: background task that runs drain cycles and spawns work.
//! - `fetch`: periodic fetch cycle and its timer.
//!
//! `execute_task` admits under the same lock when a slot is free and queues
//! otherwise. Either way it returns without waiting for the work function;
//! outcomes are observed through [`Scheduler::task_events`] or the snapshot
//! reads.

mod builder;
mod fetch;
mod pump;
mod state;


use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use builder::SchedulerBuilder;

use self::state::{Execution, Launch, SchedulerState};
use crate::config::SchedulerConfig;
use crate::domain::{FetchResult, TaskId, TaskRecord, TaskRequest};
use crate::error::SchedulerError;
use crate::lifecycle::{Capability, CapabilityState};
use crate::observability::{MetricsAggregator, SchedulerMetrics, TaskEvents};
use crate::ports::{Clock, PlatformScheduler};
use crate::registry::{RegisteredTask, WorkFunction};

/// Background scheduler. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    state: Mutex<SchedulerState>,
    clock: Arc<dyn Clock>,
    platform: Arc<dyn PlatformScheduler>,
    metrics: Arc<MetricsAggregator>,
    notify: Arc<Notify>,
    background: Mutex<Option<Background>>,
    fetch_interval: Option<Duration>,
    fetch_timeout: Duration,
    max_concurrent: usize,
}

/// Pump and fetch timer of one activation, and the runtime work is spawned on.
struct Background {
    runtime: Handle,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Background {
    fn stop(self) {
        // Receivers may already be gone.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            handle.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn background(&self) -> MutexGuard<'_, Option<Background>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one drain cycle and spawn the admitted work. Returns when the pump
    /// should wake up on its own.
    fn drain_and_launch(self: &Arc<Self>) -> Option<DateTime<Utc>> {
        let (launches, next_wake) = {
            let mut state = self.lock();
            let now = self.clock.now();
            let launches = state.drain(now);
            (launches, state.next_wake(now))
        };
        for launch in launches {
            self.launch(launch);
        }
        next_wake
    }

    fn launch(self: &Arc<Self>, launch: Launch) {
        let Some(runtime) = self.background().as_ref().map(|b| b.runtime.clone()) else {
            // Deactivated in between; shutdown already cancelled the record.
            debug!(task = %launch.identifier, "launch after deactivation dropped");
            return;
        };
        let Launch {
            identifier,
            token,
            work,
        } = launch;
        let scheduler = Arc::downgrade(self);

        let worker = runtime.clone();
        runtime.spawn(async move {
            let started = Instant::now();
            // Inner task so a panicking work function surfaces as a JoinError.
            let outcome = match worker.spawn(async move { work.execute().await }).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.to_string()),
                Err(err) if err.is_panic() => Err(format!(
                    "work function panicked: {}",
                    panic_message(err.into_panic())
                )),
                Err(err) => Err(format!("work function aborted: {err}")),
            };
            let elapsed = started.elapsed();

            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.finish(&identifier, token, outcome, elapsed);
            }
        });
    }

    fn finish(&self, identifier: &TaskId, token: u64, outcome: Result<(), String>, elapsed: Duration) {
        let applied = {
            let mut state = self.lock();
            let now = self.clock.now();
            state.complete(identifier, token, outcome, elapsed, now)
        };
        if applied {
            self.notify.notify_one();
        }
    }

    /// Run an execution decision: spawn inline admissions, wake the pump for
    /// queued ones.
    fn dispatch(self: &Arc<Self>, execution: Execution) {
        match execution {
            Execution::Started(launch) => self.launch(launch),
            Execution::Queued => self.notify.notify_one(),
            Execution::Unchanged => {}
        }
    }

    /// Must be called from within a tokio runtime.
    fn start_background(self: &Arc<Self>) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut handles = vec![tokio::spawn(pump::run(
            Arc::downgrade(self),
            Arc::clone(&self.notify),
            shutdown_rx.clone(),
        ))];
        if let Some(period) = self.fetch_interval {
            handles.push(tokio::spawn(fetch::run_timer(
                Arc::downgrade(self),
                period,
                shutdown_rx,
            )));
        }

        let background = Background {
            runtime: Handle::current(),
            shutdown,
            handles,
        };
        if let Some(previous) = self.background().replace(background) {
            previous.stop();
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Scheduler with the given config and default collaborators.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        SchedulerBuilder::new().config(config).build()
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Acquire the platform and start accepting work.
    ///
    /// No-op when already available or restricted. On acquisition failure the
    /// capability becomes unavailable and the error is returned.
    pub async fn activate(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.inner.lock();
            if matches!(
                state.lifecycle.state(),
                CapabilityState::Available | CapabilityState::Restricted
            ) {
                return Ok(());
            }
            state.lifecycle.begin_activation()?;
        }
        info!("activating scheduler");

        if let Err(err) = self.inner.platform.acquire().await {
            let mut state = self.inner.lock();
            if let Err(transition) = state.lifecycle.fail_activation() {
                debug!(error = %transition, "activation failure after state changed");
            }
            warn!(error = %err, "scheduler activation failed");
            return Err(err.into());
        }

        {
            let mut state = self.inner.lock();
            state.lifecycle.complete_activation()?;
            state.reopen_events();
            self.inner.start_background();
        }
        info!(max_concurrent = self.inner.max_concurrent, "scheduler available");
        Ok(())
    }

    /// Cancel everything queued or running, close the event channel, stop
    /// background tasks and release the platform.
    ///
    /// Work functions already running are not interrupted; their completions
    /// are discarded.
    pub fn deactivate(&self) {
        let background = {
            let mut state = self.inner.lock();
            if let Err(err) = state.lifecycle.begin_termination() {
                debug!(error = %err, "deactivate ignored");
                return;
            }
            let background = self.inner.background().take();
            let now = self.inner.clock.now();
            state.shutdown(now);
            if let Err(err) = state.lifecycle.finish_termination() {
                warn!(error = %err, "termination did not complete");
            }
            background
        };
        if let Some(background) = background {
            background.stop();
        }
        self.inner.platform.release();
        info!("scheduler unavailable");
    }

    /// Enter the restricted state: scheduling calls fail, running work
    /// continues, nothing new is admitted.
    pub fn restrict(&self) -> Result<(), SchedulerError> {
        self.inner.lock().lifecycle.restrict()?;
        info!("scheduler restricted");
        Ok(())
    }

    pub fn restore(&self) -> Result<(), SchedulerError> {
        self.inner.lock().lifecycle.restore()?;
        info!("scheduler restored");
        self.inner.notify.notify_one();
        Ok(())
    }

    pub fn state(&self) -> CapabilityState {
        self.inner.lock().lifecycle.state()
    }

    // ── registry ────────────────────────────────────────────────────────────

    /// Register a task with its work function.
    ///
    /// Platform-relevant constraints are forwarded as a best-effort hint after
    /// the task is stored; a rejected hint is logged and otherwise ignored.
    pub async fn register_task(
        &self,
        request: TaskRequest,
        work: Arc<dyn WorkFunction>,
    ) -> Result<(), SchedulerError> {
        self.register(request, Some(work)).await
    }

    /// Register a task whose work function is bound later with
    /// [`bind_handler`](Self::bind_handler).
    pub async fn declare_task(&self, request: TaskRequest) -> Result<(), SchedulerError> {
        self.register(request, None).await
    }

    async fn register(
        &self,
        request: TaskRequest,
        work: Option<Arc<dyn WorkFunction>>,
    ) -> Result<(), SchedulerError> {
        let hint = {
            let mut state = self.inner.lock();
            let now = self.inner.clock.now();
            state.register(request, work, now)?
        };
        if let Some(hint) = hint
            && let Err(err) = self.inner.platform.submit(&hint).await
        {
            warn!(task = %hint.identifier, error = %err, "platform hint rejected");
        }
        Ok(())
    }

    pub fn bind_handler(
        &self,
        identifier: &TaskId,
        work: Arc<dyn WorkFunction>,
    ) -> Result<(), SchedulerError> {
        self.inner.lock().bind(identifier, work)
    }

    /// Remove a task. Unknown identifiers are a no-op. Any live record is
    /// cancelled and a submitted platform hint is withdrawn.
    pub async fn unregister_task(&self, identifier: &TaskId) {
        let hinted = {
            let mut state = self.inner.lock();
            let now = self.inner.clock.now();
            state.unregister(identifier, now)
        };
        match hinted {
            None => debug!(task = %identifier, "unregister of unknown task ignored"),
            Some(true) => {
                if let Err(err) = self.inner.platform.cancel(identifier).await {
                    warn!(task = %identifier, error = %err, "platform hint cancel failed");
                }
                self.inner.notify.notify_one();
            }
            Some(false) => self.inner.notify.notify_one(),
        }
    }

    pub fn set_scheduling_enabled(&self, enabled: bool) {
        self.inner.lock().set_scheduling_enabled(enabled);
    }

    pub fn scheduling_enabled(&self) -> bool {
        self.inner.lock().scheduling_enabled()
    }

    // ── execution ───────────────────────────────────────────────────────────

    /// Request execution. Admits the task right away when a slot is free,
    /// otherwise queues it for the pump. Never waits for the work function.
    pub fn execute_task(&self, identifier: &TaskId) -> Result<(), SchedulerError> {
        let execution = {
            let mut state = self.inner.lock();
            let now = self.inner.clock.now();
            state.request_execution(identifier, now)?
        };
        self.inner.dispatch(execution);
        Ok(())
    }

    /// Cancel the task's live record, if any. A running work function keeps
    /// running but its outcome is discarded.
    pub fn cancel_task(&self, identifier: &TaskId) -> Result<(), SchedulerError> {
        let freed_slot = {
            let mut state = self.inner.lock();
            let now = self.inner.clock.now();
            state.cancel(identifier, now)?
        };
        if freed_slot {
            self.inner.notify.notify_one();
        }
        Ok(())
    }

    /// Report advisory progress in [0, 1] for a running task.
    pub fn report_progress(&self, identifier: &TaskId, progress: f64) -> Result<(), SchedulerError> {
        let mut state = self.inner.lock();
        let now = self.inner.clock.now();
        state.report_progress(identifier, progress, now)
    }

    /// Run one fetch cycle over every bound fetch task.
    pub async fn perform_fetch(&self) -> Result<FetchResult, SchedulerError> {
        self.inner.perform_fetch().await
    }

    // ── observation ─────────────────────────────────────────────────────────

    /// Subscribe to task events. The stream starts with a `Replayed` snapshot
    /// of every live record and ends when the scheduler is deactivated.
    pub fn task_events(&self) -> TaskEvents {
        let mut state = self.inner.lock();
        state.subscribe(self.inner.clock.now())
    }

    pub fn registered_tasks(&self) -> Vec<RegisteredTask> {
        self.inner.lock().registered_tasks()
    }

    /// Queued records in admission order.
    pub fn queued_tasks(&self) -> Vec<TaskRecord> {
        self.inner.lock().queued_tasks()
    }

    pub fn active_tasks(&self) -> Vec<TaskRecord> {
        self.inner.lock().active_tasks()
    }

    /// Terminal records completed at or after `since`, oldest first.
    pub fn task_history(&self, since: Option<DateTime<Utc>>) -> Vec<TaskRecord> {
        self.inner.lock().history(since)
    }

    pub fn task(&self, identifier: &TaskId) -> Option<TaskRecord> {
        self.inner.lock().task(identifier)
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let (active, queued, registered) = self.inner.lock().gauges();
        let mut metrics = self.inner.metrics.snapshot();
        metrics.active_tasks = active;
        metrics.queued_tasks = queued;
        metrics.registered_tasks = registered;
        metrics
    }
}

#[async_trait]
impl Capability for Scheduler {
    type Error = SchedulerError;

    fn state(&self) -> CapabilityState {
        Scheduler::state(self)
    }

    async fn activate(&self) -> Result<(), SchedulerError> {
        Scheduler::activate(self).await
    }

    fn deactivate(&self) {
        Scheduler::deactivate(self)
    }
}
