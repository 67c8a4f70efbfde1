use tracing::{debug, warn};

use super::model::{Job, JobId, JobStatus, NewJob};
use super::state::{StateMachine, TransitionPayload};
use super::store::{JobStore, StoreError};

/// The backing store could not be read or written; the job's state is unknown
/// to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(#[from] pub StoreError);

/// The only way the pipeline reads or writes job state.
///
/// Every write is a compare-and-set against the state machine, so at most one
/// execution can move a job out of `pending` and terminal jobs never change.
/// No caching: each call goes to the store.
#[derive(Debug)]
pub struct JobRepository<S> {
    store: S,
}

impl<S: JobStore> JobRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a new `pending` job. On error the job must be assumed absent.
    pub async fn create(&self, new: NewJob) -> Result<Job, PersistenceError> {
        let job = Job::from_new(new);
        self.store.insert(job.clone()).await?;
        debug!(job_id = %job.id, owner = %job.owner_id, "job created");
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, PersistenceError> {
        Ok(self.store.fetch(id).await?)
    }

    /// Move `id` from `from` to `to`.
    ///
    /// `Ok(true)` means the write happened. `Ok(false)` means it did not: the
    /// stored status was not `from`, the job is missing, or the edge/payload
    /// pair is not part of the state machine. `Err` means the store failed and
    /// the outcome is unknown. Anything but `Ok(true)` must be treated as
    /// "this write did not happen".
    pub async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        payload: TransitionPayload,
    ) -> Result<bool, PersistenceError> {
        let Some(update) = StateMachine::plan(from, to, payload) else {
            warn!(job_id = %id, %from, %to, "refusing transition outside the state machine");
            return Ok(false);
        };
        let applied = self.store.compare_and_set(id, from, update).await?;
        if applied {
            debug!(job_id = %id, %from, %to, "job transitioned");
        } else {
            debug!(job_id = %id, %from, %to, "transition lost compare-and-set");
        }
        Ok(applied)
    }
}
