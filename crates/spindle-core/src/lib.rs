//! spindle-core
//!
//! A concurrency-bounded, priority-ordered background task scheduler with
//! exponential-backoff retries, lifecycle events and aggregate metrics.
//!
//! # Modules
//! - **domain**: task ids, requests, records, status, events, retry decisions
//! - **queue**: admission queue, retry policy, bounded history
//! - **registry**: task definitions and work functions
//! - **scheduler**: the execution engine and its public API
//! - **lifecycle**: capability state machine gating the scheduler
//! - **observability**: event channel and metrics aggregator
//! - **ports**: clock, platform scheduler, event sink
//! - **config**: `SchedulerConfig` (TOML)

pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod scheduler;

pub use config::{ConfigError, SchedulerConfig};
pub use domain::{
    FetchResult, Priority, TaskConstraints, TaskEvent, TaskEventKind, TaskId, TaskKind, TaskRecord,
    TaskRequest, TaskStatus,
};
pub use error::{SchedulerError, WorkError};
pub use lifecycle::{Capability, CapabilityState};
pub use observability::{SchedulerMetrics, TaskEvents};
pub use registry::{RegisteredTask, WorkFunction, work_fn};
pub use scheduler::{Scheduler, SchedulerBuilder};
