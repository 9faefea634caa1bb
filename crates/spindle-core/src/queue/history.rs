//! Bounded history of terminal task records.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::domain::{TaskId, TaskRecord};

/// Terminal records, oldest first. Pushing past `limit` evicts the oldest.
#[derive(Debug)]
pub struct TaskHistory {
    records: VecDeque<TaskRecord>,
    limit: usize,
}

impl TaskHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            records: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, record: TaskRecord) {
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records completed at or after `since` (all records when `None`).
    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<TaskRecord> {
        self.records
            .iter()
            .filter(|r| match (since, r.completed_at) {
                (None, _) => true,
                (Some(since), Some(done)) => done >= since,
                (Some(_), None) => false,
            })
            .cloned()
            .collect()
    }

    /// Most recent terminal record for `identifier`, if still retained.
    pub fn latest(&self, identifier: &TaskId) -> Option<&TaskRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| &r.identifier == identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
