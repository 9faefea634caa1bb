//! Periodic fetch: run every bound fetch task and fold the outcomes.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::Inner;
use crate::domain::{FetchResult, TaskEventKind};
use crate::error::SchedulerError;

impl Inner {
    pub(super) async fn perform_fetch(self: &Arc<Self>) -> Result<FetchResult, SchedulerError> {
        let (mut events, mut pending, mut failed, executions) = {
            let mut state = self.lock();
            state.lifecycle.ensure_available()?;
            let identifiers = state.bound_fetch_tasks();
            if identifiers.is_empty() {
                drop(state);
                self.metrics.record_fetch(FetchResult::NoData);
                return Ok(FetchResult::NoData);
            }

            // Subscribe before requesting so no outcome can slip past.
            let now = self.clock.now();
            let events = state.subscribe(now);
            let mut pending = HashSet::new();
            let mut failed = false;
            let mut executions = Vec::new();
            for identifier in identifiers {
                match state.request_execution(&identifier, now) {
                    Ok(execution) => {
                        executions.push(execution);
                        pending.insert(identifier);
                    }
                    Err(err) => {
                        tracing::warn!(task = %identifier, error = %err, "fetch task not started");
                        failed = true;
                    }
                }
            }
            (events, pending, failed, executions)
        };
        for execution in executions {
            self.dispatch(execution);
        }

        let deadline = Instant::now() + self.fetch_timeout;
        while !pending.is_empty() {
            let event = match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tracing::warn!("event channel closed during fetch");
                    failed = true;
                    break;
                }
                Err(_) => {
                    tracing::warn!(outstanding = pending.len(), "fetch timed out");
                    failed = true;
                    break;
                }
            };
            if !pending.contains(&event.record.identifier) {
                continue;
            }
            match event.kind {
                TaskEventKind::Completed => {
                    pending.remove(&event.record.identifier);
                }
                TaskEventKind::AttemptFailed
                | TaskEventKind::Failed
                | TaskEventKind::Cancelled
                | TaskEventKind::Expired
                | TaskEventKind::Unregistered => {
                    pending.remove(&event.record.identifier);
                    failed = true;
                }
                _ => {}
            }
        }

        let result = if failed {
            FetchResult::Failed
        } else {
            FetchResult::NewData
        };
        self.metrics.record_fetch(result);
        tracing::info!(%result, "fetch cycle finished");
        Ok(result)
    }
}

/// Fire a fetch cycle every `period` until shutdown. The first cycle runs one
/// full period after activation.
pub(super) async fn run_timer(
    inner: Weak<Inner>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        let Some(scheduler) = inner.upgrade() else {
            break;
        };
        if let Err(err) = scheduler.perform_fetch().await {
            tracing::warn!(error = %err, "periodic fetch skipped");
        }
    }
    tracing::debug!("fetch timer stopped");
}
