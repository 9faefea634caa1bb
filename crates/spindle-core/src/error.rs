use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::TaskId;
use crate::lifecycle::{CapabilityState, LifecycleError};
use crate::ports::PlatformError;

/// Errors returned to callers of the scheduler.
///
/// Nothing that happens inside a work function surfaces here; attempt
/// failures are recorded on the Task Record instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduling is disabled")]
    SchedulingDisabled,

    #[error("duplicate task identifier={0}")]
    DuplicateTask(TaskId),

    #[error("task not found identifier={0}")]
    TaskNotFound(TaskId),

    #[error("no work function bound for identifier={0}")]
    HandlerNotFound(TaskId),

    #[error("scheduler unavailable (state={0})")]
    Unavailable(CapabilityState),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Lifecycle(LifecycleError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<LifecycleError> for SchedulerError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotAvailable(state) => SchedulerError::Unavailable(state),
            other => SchedulerError::Lifecycle(other),
        }
    }
}

/// Failure reported by a work function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WorkError {
    message: String,
}

impl WorkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for WorkError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for WorkError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
