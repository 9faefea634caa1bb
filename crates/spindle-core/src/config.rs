//! Scheduler configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! max_concurrent_tasks = 4
//! retry_base_delay_ms = 500
//! fetch_interval_ms = 900000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// Upper bound accepted for `default_max_retries` and per-request budgets.
pub const MAX_RETRIES_LIMIT: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrency ceiling for running work functions.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Retry budget for requests that do not set their own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: u32,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Terminal records kept for `task_history`; oldest evicted first.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Period of the fetch trigger. No timer runs when unset.
    #[serde(default)]
    pub fetch_interval_ms: Option<u64>,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_scheduling_enabled")]
    pub scheduling_enabled: bool,
}

fn default_max_concurrent_tasks() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_multiplier() -> u32 {
    2
}

fn default_retry_max_delay_ms() -> u64 {
    60 * 60 * 1000
}

fn default_history_limit() -> usize {
    100
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_scheduling_enabled() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            default_max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            history_limit: default_history_limit(),
            fetch_interval_ms: None,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            scheduling_enabled: default_scheduling_enabled(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid("max_concurrent_tasks must be > 0".into()));
        }
        if self.default_max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "default_max_retries must be <= {MAX_RETRIES_LIMIT}"
            )));
        }
        if self.retry_multiplier == 0 {
            return Err(ConfigError::Invalid("retry_multiplier must be >= 1".into()));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry_max_delay_ms must be >= retry_base_delay_ms".into(),
            ));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be > 0".into()));
        }
        if self.fetch_interval_ms == Some(0) {
            return Err(ConfigError::Invalid("fetch_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.retry_base_delay_ms))
            .with_multiplier(self.retry_multiplier)
            .with_max_delay(Duration::from_millis(self.retry_max_delay_ms))
    }

    pub fn fetch_interval(&self) -> Option<Duration> {
        self.fetch_interval_ms.map(Duration::from_millis)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.fetch_interval(), None);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.scheduling_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SchedulerConfig::from_toml_str("").unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = SchedulerConfig::from_toml_str(
            "max_concurrent_tasks = 1\nretry_base_delay_ms = 250\nfetch_interval_ms = 60000\n",
        )
        .unwrap();
        assert_eq!(config.max_concurrent_tasks, 1);
        assert_eq!(config.retry_policy().backoff(1), Duration::from_millis(500));
        assert_eq!(config.fetch_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = SchedulerConfig::from_toml_str("max_concurrent_tasks = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn retry_budget_is_capped() {
        let config = SchedulerConfig {
            default_max_retries: MAX_RETRIES_LIMIT + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = SchedulerConfig::from_toml_str("max_concurrent_tasks = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SchedulerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
