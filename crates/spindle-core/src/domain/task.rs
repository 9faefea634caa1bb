//! Task definitions: what a caller hands to the registry.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Informational task category. Used for metrics grouping only; it never
/// influences admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    AppRefresh,
    Fetch,
    Processing,
    UrlSession,
    Maintenance,
    Sync,
    Upload,
    Download,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::AppRefresh,
        TaskKind::Fetch,
        TaskKind::Processing,
        TaskKind::UrlSession,
        TaskKind::Maintenance,
        TaskKind::Sync,
        TaskKind::Upload,
        TaskKind::Download,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::AppRefresh => "app-refresh",
            TaskKind::Fetch => "fetch",
            TaskKind::Processing => "processing",
            TaskKind::UrlSession => "url-session",
            TaskKind::Maintenance => "maintenance",
            TaskKind::Sync => "sync",
            TaskKind::Upload => "upload",
            TaskKind::Download => "download",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission priority. The derived order is the queue's sort key:
/// `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Scheduling constraints attached to a task.
///
/// `earliest_begin`, `requires_network` and `requires_external_power` are
/// forwarded to the platform scheduler as a hint. `earliest_begin` and
/// `expires_at` are also enforced by the engine itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_begin: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub requires_network: bool,

    #[serde(default)]
    pub requires_external_power: bool,
}

impl TaskConstraints {
    /// Whether anything here is worth telling the platform scheduler about.
    pub fn needs_platform_hint(&self) -> bool {
        self.earliest_begin.is_some() || self.requires_network || self.requires_external_power
    }
}

/// Registration request for one unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub identifier: TaskId,
    pub kind: TaskKind,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub constraints: TaskConstraints,

    /// Falls back to the scheduler's configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Opaque caller data, passed through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TaskRequest {
    pub fn new(identifier: impl Into<TaskId>, kind: TaskKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            priority: Priority::default(),
            constraints: TaskConstraints::default(),
            max_retries: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.constraints.expires_at = Some(at);
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.constraints.earliest_begin = Some(at);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
