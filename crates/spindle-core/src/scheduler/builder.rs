//! SchedulerBuilder: wiring and fail-fast validation.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::state::SchedulerState;
use super::{Inner, Scheduler};
use crate::config::SchedulerConfig;
use crate::domain::{Decider, DefaultDecider};
use crate::error::SchedulerError;
use crate::observability::{EventChannel, MetricsAggregator};
use crate::ports::{Clock, EventSink, NoopPlatformScheduler, PlatformScheduler, SystemClock};

/// Builds a [`Scheduler`].
///
/// # Example
/// ```ignore
/// let scheduler = Scheduler::builder()
///     .config(SchedulerConfig::from_file("spindle.toml")?)
///     .platform(Arc::new(MyPlatform::default()))
///     .build()?;
/// scheduler.activate().await?;
/// ```
///
/// `build` validates the config and fails before anything is spawned.
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    platform: Option<Arc<dyn PlatformScheduler>>,
    decider: Option<Arc<dyn Decider>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn PlatformScheduler>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Replace the retry decision. Defaults to exponential backoff from the
    /// config's retry settings.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Add a synchronous observer of every task event.
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;

        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.retry_policy())));
        let metrics = Arc::new(MetricsAggregator::new());
        let mut sinks: Vec<Arc<dyn EventSink>> = vec![metrics.clone() as Arc<dyn EventSink>];
        sinks.extend(self.sinks);
        let channel = EventChannel::new(sinks);

        let inner = Inner {
            state: Mutex::new(SchedulerState::new(&self.config, decider, channel)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            platform: self
                .platform
                .unwrap_or_else(|| Arc::new(NoopPlatformScheduler)),
            metrics,
            notify: Arc::new(Notify::new()),
            background: Mutex::new(None),
            fetch_interval: self.config.fetch_interval(),
            fetch_timeout: self.config.fetch_timeout(),
            max_concurrent: self.config.max_concurrent_tasks,
        };
        Ok(Scheduler {
            inner: Arc::new(inner),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::CapabilityState;

    #[test]
    fn build_with_defaults() {
        let scheduler = SchedulerBuilder::new().build().unwrap();
        assert_eq!(scheduler.state(), CapabilityState::Unknown);
        assert!(scheduler.scheduling_enabled());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = SchedulerBuilder::new()
            .config(SchedulerConfig {
                history_limit: 0,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }
}
