use thiserror::Error;

use crate::admission::AdmissionRejected;
use crate::broker::BrokerError;
use crate::dispatch::{Backpressure, FailureReason};
use crate::job::{JobId, PersistenceError, ValidationError};

/// Errors surfaced to callers of the public operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Too many submissions for this principal; retry later.
    #[error(transparent)]
    AdmissionRejected(#[from] AdmissionRejected),

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("job {job_id}: generation transport error: {detail}")]
    Transport { job_id: JobId, detail: String },

    #[error("job {job_id}: generation service returned {status}: {message}")]
    Service {
        job_id: JobId,
        status: u16,
        message: String,
    },

    #[error("job {job_id}: {detail}")]
    MalformedResponse { job_id: JobId, detail: String },

    /// Store unavailable. With a `job_id` the job exists but its state is unknown.
    #[error("persistence error: {detail}")]
    Persistence {
        job_id: Option<JobId>,
        detail: String,
    },

    /// Another worker claimed or finished the job first. Nothing failed in
    /// the store; the job row holds the other worker's outcome.
    #[error("job {job_id}: {detail}")]
    Conflict { job_id: JobId, detail: String },

    #[error(transparent)]
    Backpressure(#[from] Backpressure),

    /// The job was stored as `pending` but its queue message was not
    /// published. Retry with `republish`.
    #[error("job {job_id} saved but not published: {source}")]
    Publish {
        job_id: JobId,
        #[source]
        source: BrokerError,
    },

    #[error("job not found: {0}")]
    NotFound(JobId),
}

impl PipelineError {
    pub fn from_failure(job_id: JobId, reason: FailureReason) -> Self {
        match reason {
            FailureReason::Transport(detail) => PipelineError::Transport { job_id, detail },
            FailureReason::Service { status, message } => PipelineError::Service {
                job_id,
                status,
                message,
            },
            FailureReason::MalformedResponse(detail) => {
                PipelineError::MalformedResponse { job_id, detail }
            }
            FailureReason::Persistence(detail) => PipelineError::Persistence {
                job_id: Some(job_id),
                detail,
            },
        }
    }

    /// Whether the same request may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::MalformedResponse { .. }
                | PipelineError::Conflict { .. }
                | PipelineError::NotFound(_)
        )
    }
}

impl From<PersistenceError> for PipelineError {
    fn from(err: PersistenceError) -> Self {
        PipelineError::Persistence {
            job_id: None,
            detail: err.to_string(),
        }
    }
}
