//! EventSink port: synchronous observers of task transitions.

use crate::domain::TaskEvent;

#[derive(Debug, thiserror::Error)]
#[error("event sink failed: {0}")]
pub struct SinkError(pub String);

/// Receives every published [`TaskEvent`] in transition order.
///
/// Sinks run while the scheduler state is locked: they must be quick and
/// must not call back into the scheduler. Errors are logged and dropped.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TaskEvent) -> Result<(), SinkError>;
}
