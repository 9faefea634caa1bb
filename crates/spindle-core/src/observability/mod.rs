//! Observability: event fan-out and derived metrics.

mod channel;
mod metrics;

pub(crate) use channel::EventChannel;
pub use channel::TaskEvents;
pub use metrics::{EXECUTION_TIME_SMOOTHING, FetchCounts, MetricsAggregator, SchedulerMetrics};
