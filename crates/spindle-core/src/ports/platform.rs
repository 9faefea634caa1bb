//! PlatformScheduler port: the host's background-execution service.
//!
//! The scheduler never depends on the platform for correctness. It acquires
//! the platform on activation, forwards best-effort hints for tasks with
//! external constraints, and releases the platform on deactivation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{TaskId, TaskKind, TaskRequest};

/// Constraints forwarded to the platform for one registered task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingHint {
    pub identifier: TaskId,
    pub kind: TaskKind,
    pub earliest_begin: Option<DateTime<Utc>>,
    pub requires_network: bool,
    pub requires_external_power: bool,
}

impl SchedulingHint {
    /// Hint for `request`, or `None` when it carries no platform-relevant
    /// constraint.
    pub fn for_request(request: &TaskRequest) -> Option<Self> {
        let constraints = &request.constraints;
        constraints.needs_platform_hint().then(|| Self {
            identifier: request.identifier.clone(),
            kind: request.kind,
            earliest_begin: constraints.earliest_begin,
            requires_network: constraints.requires_network,
            requires_external_power: constraints.requires_external_power,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform resource unavailable: {0}")]
    Unavailable(String),

    #[error("platform rejected request for task={identifier}: {reason}")]
    Rejected { identifier: TaskId, reason: String },
}

#[async_trait]
pub trait PlatformScheduler: Send + Sync {
    /// Acquire the underlying resource. Called on every activation.
    async fn acquire(&self) -> Result<(), PlatformError>;

    async fn submit(&self, hint: &SchedulingHint) -> Result<(), PlatformError>;

    async fn cancel(&self, identifier: &TaskId) -> Result<(), PlatformError>;

    /// Release the resource. Runs synchronously inside `deactivate`.
    fn release(&self);
}

/// Platform that accepts everything and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlatformScheduler;

#[async_trait]
impl PlatformScheduler for NoopPlatformScheduler {
    async fn acquire(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn submit(&self, _hint: &SchedulingHint) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn cancel(&self, _identifier: &TaskId) -> Result<(), PlatformError> {
        Ok(())
    }

    fn release(&self) {}
}
