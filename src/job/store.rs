//! Raw job persistence.
//!
//! [`JobStore`] is the narrow CRUD-by-id contract of the backing database:
//! insert, fetch, and an atomic compare-and-set on the status column. State
//! machine rules live one layer up in [`JobRepository`](super::JobRepository).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::model::{Job, JobId, JobStatus};
use super::state::StatusUpdate;

/// Backing store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Job persistence contract.
pub trait JobStore: Send + Sync + 'static {
    /// Persist a new job.
    fn insert(&self, job: Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load a job by id.
    fn fetch(&self, id: JobId) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    /// Apply `update` only if the stored status equals `expected`.
    ///
    /// Returns `Ok(false)` when the job is missing or its status differs.
    fn compare_and_set(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// In-memory job store for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("job table lock poisoned".into())
}

impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn fetch(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&id).cloned())
    }

    async fn compare_and_set(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != expected {
            return Ok(false);
        }
        job.status = update.status;
        job.result_primary = update.result_primary;
        job.result_secondary = update.result_secondary;
        job.failure_detail = update.failure_detail;
        job.updated_at = Utc::now();
        Ok(true)
    }
}

impl<S: JobStore> JobStore for Arc<S> {
    fn insert(&self, job: Job) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).insert(job)
    }

    fn fetch(&self, id: JobId) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send {
        (**self).fetch(id)
    }

    fn compare_and_set(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        (**self).compare_and_set(id, expected, update)
    }
}
