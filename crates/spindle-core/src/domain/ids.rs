//! Task identifiers.
//!
//! Identifiers are supplied by the caller at registration time and are never
//! regenerated by the scheduler. Callers without a natural name for a unit of
//! work can mint one with [`TaskId::generate`], which produces a ULID-based
//! identifier that sorts by creation time.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::ports::Clock;

/// Prefix used by generated identifiers.
const GENERATED_PREFIX: &str = "task-";

/// Caller-supplied identifier of a registered task, unique within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a fresh identifier whose timestamp component comes from `clock`.
    ///
    /// Two identifiers generated under the same clock reading still differ
    /// in their random component.
    pub fn generate(clock: &dyn Clock) -> Self {
        let timestamp_ms = clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Self(format!("{GENERATED_PREFIX}{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
