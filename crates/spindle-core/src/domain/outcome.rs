//! Aggregate outcome of a periodic fetch cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tri-state result of one fetch cycle across all fetch-kind tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchResult {
    /// Every fetch task ran to completion.
    NewData,

    /// There was nothing to fetch.
    NoData,

    /// At least one fetch task failed, was cancelled, expired or timed out.
    Failed,
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchResult::NewData => "new-data",
            FetchResult::NoData => "no-data",
            FetchResult::Failed => "failed",
        };
        f.write_str(s)
    }
}
