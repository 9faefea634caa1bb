//! Task registry: known task definitions and their work functions.
//!
//! # Usage
//! ```ignore
//! let work = work_fn(|| async {
//!     refresh_feed().await.map_err(|e| WorkError::new(e.to_string()))
//! });
//! scheduler.register_task(TaskRequest::new("feed", TaskKind::Fetch), work).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{TaskId, TaskKind, TaskRecord, TaskRequest};
use crate::error::{SchedulerError, WorkError};

/// The opaque operation a task wraps.
///
/// The scheduler only observes success, failure and elapsed time.
#[async_trait]
pub trait WorkFunction: Send + Sync {
    async fn execute(&self) -> Result<(), WorkError>;
}

/// Adapts an async closure into a [`WorkFunction`].
pub struct FnWork<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> WorkFunction for FnWork<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    async fn execute(&self) -> Result<(), WorkError> {
        (self.f)().await
    }
}

pub fn work_fn<F, Fut>(f: F) -> Arc<dyn WorkFunction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    Arc::new(FnWork {
        f,
        _fut: PhantomData,
    })
}

/// A registered task definition.
pub(crate) struct TaskDefinition {
    pub(crate) request: TaskRequest,
    pub(crate) max_retries: u32,

    /// Number of records created so far.
    pub(crate) runs: u64,

    /// A platform hint was submitted and must be cancelled on unregister.
    pub(crate) hinted: bool,

    /// Record created but not yet requested for execution.
    pub(crate) idle: Option<TaskRecord>,

    work: Option<Arc<dyn WorkFunction>>,
}

impl TaskDefinition {
    fn new(request: TaskRequest, max_retries: u32, work: Option<Arc<dyn WorkFunction>>) -> Self {
        Self {
            request,
            max_retries,
            runs: 0,
            hinted: false,
            idle: None,
            work,
        }
    }

    /// Create the record for the next run.
    pub(crate) fn next_record(&mut self, sequence: u64, now: DateTime<Utc>) -> TaskRecord {
        self.runs += 1;
        TaskRecord::new(&self.request, self.max_retries, self.runs, sequence, now)
    }

    pub(crate) fn work(&self) -> Option<Arc<dyn WorkFunction>> {
        self.work.clone()
    }

    fn summary(&self) -> RegisteredTask {
        RegisteredTask {
            request: self.request.clone(),
            max_retries: self.max_retries,
            runs: self.runs,
            bound: self.work.is_some(),
        }
    }
}

/// Read-only view of a registered definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredTask {
    pub request: TaskRequest,
    /// Effective retry budget after defaults were applied.
    pub max_retries: u32,
    pub runs: u64,
    /// A work function is attached.
    pub bound: bool,
}

#[derive(Default)]
pub(crate) struct TaskRegistry {
    definitions: HashMap<TaskId, TaskDefinition>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(
        &mut self,
        request: TaskRequest,
        max_retries: u32,
        work: Option<Arc<dyn WorkFunction>>,
    ) -> Result<&mut TaskDefinition, SchedulerError> {
        use std::collections::hash_map::Entry;

        match self.definitions.entry(request.identifier.clone()) {
            Entry::Occupied(_) => Err(SchedulerError::DuplicateTask(request.identifier)),
            Entry::Vacant(slot) => Ok(slot.insert(TaskDefinition::new(request, max_retries, work))),
        }
    }

    pub(crate) fn bind(
        &mut self,
        identifier: &TaskId,
        work: Arc<dyn WorkFunction>,
    ) -> Result<(), SchedulerError> {
        let definition = self
            .definitions
            .get_mut(identifier)
            .ok_or_else(|| SchedulerError::TaskNotFound(identifier.clone()))?;
        definition.work = Some(work);
        Ok(())
    }

    pub(crate) fn get(&self, identifier: &TaskId) -> Option<&TaskDefinition> {
        self.definitions.get(identifier)
    }

    pub(crate) fn get_mut(&mut self, identifier: &TaskId) -> Option<&mut TaskDefinition> {
        self.definitions.get_mut(identifier)
    }

    pub(crate) fn remove(&mut self, identifier: &TaskId) -> Option<TaskDefinition> {
        self.definitions.remove(identifier)
    }

    pub(crate) fn contains(&self, identifier: &TaskId) -> bool {
        self.definitions.contains_key(identifier)
    }

    pub(crate) fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Summaries sorted by identifier.
    pub(crate) fn summaries(&self) -> Vec<RegisteredTask> {
        let mut out: Vec<_> = self.definitions.values().map(TaskDefinition::summary).collect();
        out.sort_by(|a, b| a.request.identifier.cmp(&b.request.identifier));
        out
    }

    /// Idle records, i.e. registered but never requested.
    pub(crate) fn idle_records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.definitions.values().filter_map(|d| d.idle.as_ref())
    }

    /// Identifiers of every fetch-kind definition with a work function, sorted.
    pub(crate) fn bound_of_kind(&self, kind: TaskKind) -> Vec<TaskId> {
        let mut ids: Vec<_> = self
            .definitions
            .values()
            .filter(|d| d.request.kind == kind && d.work.is_some())
            .map(|d| d.request.identifier.clone())
            .collect();
        ids.sort();
        ids
    }
}
