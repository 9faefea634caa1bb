//! The pump: the only place drain cycles run.
//!
//! Requests that may free or fill a slot call `Notify::notify_one`. If the
//! pump is mid-drain the permit is stored and the next cycle runs right after,
//! never concurrently. Between cycles the pump sleeps until the earliest
//! deferred record becomes eligible, so retries need no timer of their own.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Notify, watch};

use super::Inner;
use crate::ports::clock::until;

pub(super) async fn run(
    inner: Weak<Inner>,
    notify: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("pump started");
    loop {
        let Some(scheduler) = inner.upgrade() else {
            break;
        };
        let next_wake = scheduler.drain_and_launch();
        let sleep_for = next_wake.map(|at| until(scheduler.clock.now(), at));
        drop(scheduler);

        tokio::select! {
            _ = notify.notified() => {}
            _ = sleep_or_park(sleep_for) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("pump stopped");
}

async fn sleep_or_park(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
