//! Admission queue: priority-ordered backlog of tasks waiting for a slot.
//!
//! Order: priority descending, then earliest `created_at`, then creation
//! sequence. Records whose `not_before` lies in the future stay in place but
//! are skipped by [`AdmissionQueue::pop_eligible`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::{Priority, TaskId, TaskRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<Priority>,
    created_at: DateTime<Utc>,
    sequence: u64,
}

impl QueueKey {
    fn of(record: &TaskRecord) -> Self {
        Self {
            priority: Reverse(record.priority),
            created_at: record.created_at,
            sequence: record.sequence,
        }
    }
}

/// Backlog of queued records.
///
/// Invariant: `entries` and `index` always describe the same set of tasks.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    entries: BTreeMap<QueueKey, TaskRecord>,
    index: HashMap<TaskId, QueueKey>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any entry for the same identifier.
    pub fn push(&mut self, record: TaskRecord) {
        let key = QueueKey::of(&record);
        if let Some(previous) = self.index.insert(record.identifier.clone(), key) {
            self.entries.remove(&previous);
        }
        self.entries.insert(key, record);
    }

    pub fn remove(&mut self, identifier: &TaskId) -> Option<TaskRecord> {
        let key = self.index.remove(identifier)?;
        self.entries.remove(&key)
    }

    pub fn get(&self, identifier: &TaskId) -> Option<&TaskRecord> {
        self.index
            .get(identifier)
            .and_then(|key| self.entries.get(key))
    }

    pub fn contains(&self, identifier: &TaskId) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return the highest-ordered record that may start at `now`.
    pub fn pop_eligible(&mut self, now: DateTime<Utc>) -> Option<TaskRecord> {
        let key = self
            .entries
            .iter()
            .find(|(_, record)| record.is_eligible(now))
            .map(|(key, _)| *key)?;
        let record = self.entries.remove(&key)?;
        self.index.remove(&record.identifier);
        Some(record)
    }

    /// Would an eligible queued record be admitted before `record`?
    pub fn has_eligible_ahead_of(&self, record: &TaskRecord, now: DateTime<Utc>) -> bool {
        self.entries
            .range(..QueueKey::of(record))
            .any(|(_, queued)| queued.is_eligible(now))
    }

    /// Earliest future instant at which a deferred record becomes eligible.
    pub fn next_eligible_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .values()
            .filter_map(TaskRecord::not_before)
            .filter(|at| *at > now)
            .min()
    }

    /// Records in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.entries.values()
    }

    /// Empty the queue, returning records in admission order.
    pub fn drain(&mut self) -> Vec<TaskRecord> {
        self.index.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskKind, TaskRequest};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn queued(id: &str, priority: Priority, created: i64, sequence: u64) -> TaskRecord {
        let request = TaskRequest::new(id, TaskKind::Processing).with_priority(priority);
        let mut record = TaskRecord::new(&request, 0, 1, sequence, at(created));
        record.mark_queued();
        record
    }

    fn pop_all(queue: &mut AdmissionQueue, now: DateTime<Utc>) -> Vec<String> {
        std::iter::from_fn(|| queue.pop_eligible(now))
            .map(|r| r.identifier.to_string())
            .collect()
    }

    #[test]
    fn pops_by_priority_descending() {
        let mut queue = AdmissionQueue::new();
        queue.push(queued("a", Priority::Low, 0, 0));
        queue.push(queued("b", Priority::Critical, 1, 1));
        queue.push(queued("c", Priority::Normal, 2, 2));
        queue.push(queued("d", Priority::High, 3, 3));

        assert_eq!(pop_all(&mut queue, at(10)), ["b", "d", "c", "a"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn equal_priority_is_fifo_by_creation() {
        let mut queue = AdmissionQueue::new();
        queue.push(queued("late", Priority::Normal, 5, 0));
        queue.push(queued("early", Priority::Normal, 1, 1));
        queue.push(queued("same-instant-second", Priority::Normal, 3, 3));
        queue.push(queued("same-instant-first", Priority::Normal, 3, 2));

        assert_eq!(
            pop_all(&mut queue, at(10)),
            ["early", "same-instant-first", "same-instant-second", "late"]
        );
    }

    #[test]
    fn deferred_records_are_skipped_until_due() {
        let mut queue = AdmissionQueue::new();
        let mut backing_off = queued("retry", Priority::Critical, 0, 0);
        backing_off.next_attempt_at = Some(at(20));
        queue.push(backing_off);
        queue.push(queued("ready", Priority::Low, 1, 1));

        assert_eq!(queue.next_eligible_at(at(10)), Some(at(20)));
        assert_eq!(pop_all(&mut queue, at(10)), ["ready"]);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_eligible(at(19)).is_none());
        assert_eq!(pop_all(&mut queue, at(20)), ["retry"]);
    }

    #[test]
    fn remove_and_replace_keep_index_consistent() {
        let mut queue = AdmissionQueue::new();
        queue.push(queued("x", Priority::Low, 0, 0));
        queue.push(queued("x", Priority::High, 0, 0));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(&TaskId::new("x")).map(|r| r.priority), Some(Priority::High));

        assert!(queue.remove(&TaskId::new("x")).is_some());
        assert!(!queue.contains(&TaskId::new("x")));
        assert!(queue.remove(&TaskId::new("x")).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_returns_admission_order() {
        let mut queue = AdmissionQueue::new();
        queue.push(queued("n", Priority::Normal, 0, 0));
        queue.push(queued("h", Priority::High, 1, 1));
        let ids: Vec<_> = queue.drain().into_iter().map(|r| r.identifier).collect();
        assert_eq!(ids, [TaskId::new("h"), TaskId::new("n")]);
        assert!(!queue.contains(&TaskId::new("n")));
    }

    #[test]
    fn only_eligible_higher_ranked_records_are_ahead() {
        let mut queue = AdmissionQueue::new();
        let mut deferred = queued("deferred", Priority::Critical, 0, 0);
        deferred.next_attempt_at = Some(at(60));
        queue.push(deferred);
        queue.push(queued("low", Priority::Low, 0, 1));

        let candidate = queued("normal", Priority::Normal, 5, 2);
        assert!(!queue.has_eligible_ahead_of(&candidate, at(10)));
        assert!(queue.has_eligible_ahead_of(&candidate, at(60)));

        queue.push(queued("high", Priority::High, 9, 3));
        assert!(queue.has_eligible_ahead_of(&candidate, at(10)));
    }
}
