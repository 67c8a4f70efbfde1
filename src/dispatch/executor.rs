//! The worker body shared by every dispatcher and the queue consumer:
//! claim the job, call the generation service, split the reply, and record
//! the terminal state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::GenerationConfig;
use crate::job::{Job, JobId, JobRepository, JobStatus, JobStore, PersistenceError, TransitionPayload};
use crate::llm::{GenerationError, Generator};
use crate::prompt::PromptBuilder;
use crate::segmenter::{MalformedResponse, Segmenter, Segments};
use crate::stats::PipelineStats;

/// Why a claimed job ended in `failed`. Its `Display` form is stored as the
/// job's `failure_detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Network failure or timeout talking to the generation service.
    Transport(String),
    /// The generation service answered with an error.
    Service { status: u16, message: String },
    /// The reply did not follow the delimited format.
    MalformedResponse(String),
    /// Results were produced but could not be stored.
    Persistence(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureReason::Service { status, message } => {
                write!(f, "service error (status {status}): {message}")
            }
            FailureReason::MalformedResponse(msg) => write!(f, "{msg}"),
            FailureReason::Persistence(msg) => write!(f, "could not store results: {msg}"),
        }
    }
}

impl From<GenerationError> for FailureReason {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Transport(e) => FailureReason::Transport(e.to_string()),
            GenerationError::Service { status, message } => {
                FailureReason::Service { status, message }
            }
        }
    }
}

impl From<MalformedResponse> for FailureReason {
    fn from(err: MalformedResponse) -> Self {
        FailureReason::MalformedResponse(err.to_string())
    }
}

/// How one execution attempt ended.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Job is `done` with these artifacts.
    Done(Segments),
    /// Job is `failed` with this reason.
    Failed(FailureReason),
    /// The claim lost: the job was not `pending`. Nothing was changed.
    Duplicate { observed: Option<JobStatus> },
    /// The claim could not be attempted; the job is untouched.
    ClaimError(PersistenceError),
    /// Another writer finished the job first.
    Superseded,
    /// The terminal write failed; the job is left `running`.
    Orphaned(PersistenceError),
}

impl ExecutionOutcome {
    /// Whether a terminal state was recorded (by us or a concurrent writer).
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Done(_) | ExecutionOutcome::Failed(_) | ExecutionOutcome::Superseded
        )
    }
}

/// Runs one job through `pending → running → {done | failed}`.
///
/// No lock is held across the generation call; the claim compare-and-set is
/// the only thing serializing executions of the same job.
pub struct Executor<S, G> {
    repo: Arc<JobRepository<S>>,
    generator: Arc<G>,
    prompts: PromptBuilder,
    segmenter: Segmenter,
    stats: Arc<PipelineStats>,
}

impl<S, G> Clone for Executor<S, G> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            generator: self.generator.clone(),
            prompts: self.prompts.clone(),
            segmenter: self.segmenter.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<S: JobStore, G: Generator> Executor<S, G> {
    pub fn new(
        repo: Arc<JobRepository<S>>,
        generator: Arc<G>,
        config: &GenerationConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            repo,
            generator,
            prompts: PromptBuilder::new(config.delimiter.clone()),
            segmenter: Segmenter::from_config(config),
            stats,
        }
    }

    pub fn repository(&self) -> &Arc<JobRepository<S>> {
        &self.repo
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub async fn execute(&self, job: &Job) -> ExecutionOutcome {
        match self
            .repo
            .transition(job.id, JobStatus::Pending, JobStatus::Running, TransitionPayload::Empty)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.stats.record_duplicate_claim();
                let observed = match self.repo.get(job.id).await {
                    Ok(found) => found.map(|j| j.status),
                    Err(_) => None,
                };
                info!(job_id = %job.id, ?observed, "job already claimed, skipping");
                return ExecutionOutcome::Duplicate { observed };
            }
            Err(e) => {
                self.stats.record_claim_error();
                warn!(job_id = %job.id, error = %e, "could not claim job");
                return ExecutionOutcome::ClaimError(e);
            }
        }

        let prompt = self.prompts.build(job);
        let result = match self.generator.generate(&prompt).await {
            Ok(raw) => self.segmenter.segment(&raw).map_err(FailureReason::from),
            Err(e) => Err(FailureReason::from(e)),
        };

        match result {
            Ok(segments) => self.finish_done(job.id, segments).await,
            Err(reason) => self.finish_failed(job.id, reason).await,
        }
    }

    async fn finish_done(&self, id: JobId, segments: Segments) -> ExecutionOutcome {
        let payload = TransitionPayload::Results {
            primary: segments.primary.clone(),
            secondary: segments.secondary.clone(),
        };
        match self
            .repo
            .transition(id, JobStatus::Running, JobStatus::Done, payload)
            .await
        {
            Ok(true) => {
                self.stats.record_done();
                info!(job_id = %id, "job done");
                ExecutionOutcome::Done(segments)
            }
            Ok(false) => {
                warn!(job_id = %id, "job left running state before results were stored");
                ExecutionOutcome::Superseded
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "storing results failed, marking job failed");
                self.finish_failed(id, FailureReason::Persistence(e.to_string()))
                    .await
            }
        }
    }

    async fn finish_failed(&self, id: JobId, reason: FailureReason) -> ExecutionOutcome {
        let payload = TransitionPayload::Failure {
            detail: reason.to_string(),
        };
        match self
            .repo
            .transition(id, JobStatus::Running, JobStatus::Failed, payload)
            .await
        {
            Ok(true) => {
                self.stats.record_failed();
                warn!(job_id = %id, reason = %reason, "job failed");
                ExecutionOutcome::Failed(reason)
            }
            Ok(false) => {
                warn!(job_id = %id, "job left running state before failure was stored");
                ExecutionOutcome::Superseded
            }
            Err(e) => {
                self.stats.record_orphan();
                error!(
                    job_id = %id,
                    error = %e,
                    reason = %reason,
                    "terminal write failed, job left running for reconciliation"
                );
                ExecutionOutcome::Orphaned(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InMemoryJobStore, JobInput, NewJob};
    use crate::testing::{FlakyStore, ScriptedGenerator};

    async fn setup<S: JobStore, G: Generator>(
        store: S,
        generator: G,
    ) -> (Executor<S, G>, Job, Arc<G>) {
        let repo = Arc::new(JobRepository::new(store));
        let generator = Arc::new(generator);
        let executor = Executor::new(
            repo.clone(),
            generator.clone(),
            &GenerationConfig::default(),
            Arc::new(PipelineStats::default()),
        );
        let job = repo
            .create(NewJob::new("u1", JobInput::new("compare sales", "month,sales\nJan,10\nFeb,20")).unwrap())
            .await
            .unwrap();
        (executor, job, generator)
    }

    #[tokio::test]
    async fn well_formed_reply_ends_done() {
        let (executor, job, _) = setup(InMemoryJobStore::new(), ScriptedGenerator::well_formed()).await;

        let outcome = executor.execute(&job).await;
        let ExecutionOutcome::Done(segments) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(segments.primary, r#"{"series": [{"type": "bar"}]}"#);

        let stored = executor.repository().get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Done);
        assert_eq!(stored.result_secondary.as_deref(), Some("Feb sales doubled Jan."));
        assert_eq!(executor.stats().snapshot().done, 1);
    }

    #[tokio::test]
    async fn malformed_reply_ends_failed_with_detail() {
        let (executor, job, _) =
            setup(InMemoryJobStore::new(), ScriptedGenerator::replying("no delimiters here")).await;

        let outcome = executor.execute(&job).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed(FailureReason::MalformedResponse(_))
        ));
        let stored = executor.repository().get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.failure_detail.unwrap().starts_with("malformed response"));
        assert!(stored.result_primary.is_none());
    }

    #[tokio::test]
    async fn service_error_ends_failed() {
        let (executor, job, _) =
            setup(InMemoryJobStore::new(), ScriptedGenerator::failing(500, "upstream down")).await;

        executor.execute(&job).await;
        let stored = executor.repository().get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(
            stored.failure_detail.as_deref(),
            Some("service error (status 500): upstream down")
        );
    }

    #[tokio::test]
    async fn second_execution_is_a_noop() {
        let (executor, job, generator) =
            setup(InMemoryJobStore::new(), ScriptedGenerator::well_formed()).await;

        assert!(matches!(executor.execute(&job).await, ExecutionOutcome::Done(_)));
        let again = executor.execute(&job).await;
        assert!(matches!(
            again,
            ExecutionOutcome::Duplicate { observed: Some(JobStatus::Done) }
        ));
        assert_eq!(generator.calls(), 1);
        assert_eq!(executor.stats().snapshot().duplicate_claims, 1);
    }

    #[tokio::test]
    async fn claim_outage_leaves_job_pending() {
        let store = FlakyStore::default();
        store.fail_writes_to(JobStatus::Running);
        let (executor, job, generator) = setup(store, ScriptedGenerator::well_formed()).await;

        assert!(matches!(executor.execute(&job).await, ExecutionOutcome::ClaimError(_)));
        assert_eq!(generator.calls(), 0);
        let stored = executor.repository().get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn results_write_outage_falls_back_to_failed() {
        let store = FlakyStore::default();
        store.fail_writes_to(JobStatus::Done);
        let (executor, job, _) = setup(store, ScriptedGenerator::well_formed()).await;

        let outcome = executor.execute(&job).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed(FailureReason::Persistence(_))
        ));
        let stored = executor.repository().get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn total_terminal_outage_orphans_running_job() {
        let store = FlakyStore::default();
        store.fail_writes_to(JobStatus::Done);
        store.fail_writes_to(JobStatus::Failed);
        let (executor, job, _) = setup(store, ScriptedGenerator::well_formed()).await;

        assert!(matches!(executor.execute(&job).await, ExecutionOutcome::Orphaned(_)));
        let stored = executor.repository().get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(executor.stats().snapshot().orphaned, 1);
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(
            FailureReason::Transport("timed out".into()).to_string(),
            "transport error: timed out"
        );
        assert_eq!(
            FailureReason::Persistence("db down".into()).to_string(),
            "could not store results: db down"
        );
    }
}
