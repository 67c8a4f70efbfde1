use serde::Serialize;

use super::executor::{ExecutionOutcome, Executor};
use crate::error::PipelineError;
use crate::job::{Job, JobId, JobStore};
use crate::llm::Generator;

/// Artifacts returned to a synchronous caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub job_id: JobId,
    pub primary: String,
    pub secondary: String,
}

/// Executes generation on the caller's task; the caller waits for the
/// terminal state.
pub struct InlineDispatcher<S, G> {
    executor: Executor<S, G>,
}

impl<S: JobStore, G: Generator> InlineDispatcher<S, G> {
    pub fn new(executor: Executor<S, G>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, job: &Job) -> Result<SyncResult, PipelineError> {
        match self.executor.execute(job).await {
            ExecutionOutcome::Done(segments) => Ok(SyncResult {
                job_id: job.id,
                primary: segments.primary,
                secondary: segments.secondary,
            }),
            ExecutionOutcome::Failed(reason) => Err(PipelineError::from_failure(job.id, reason)),
            ExecutionOutcome::Duplicate { observed } => Err(PipelineError::Conflict {
                job_id: job.id,
                detail: match observed {
                    Some(status) => format!("job was already {status}"),
                    None => "job disappeared before it could be claimed".to_string(),
                },
            }),
            ExecutionOutcome::ClaimError(e) | ExecutionOutcome::Orphaned(e) => {
                Err(PipelineError::Persistence {
                    job_id: Some(job.id),
                    detail: e.to_string(),
                })
            }
            ExecutionOutcome::Superseded => Err(PipelineError::Conflict {
                job_id: job.id,
                detail: "job was finished by another worker".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::GenerationConfig;
    use crate::job::{InMemoryJobStore, JobInput, JobRepository, JobStatus, NewJob, TransitionPayload};
    use crate::llm::ChatClient;
    use crate::stats::PipelineStats;
    use crate::testing::{FlakyStore, ScriptedGenerator};

    fn dispatcher<S: JobStore, G: Generator>(
        store: S,
        generator: G,
        config: &GenerationConfig,
    ) -> (InlineDispatcher<S, G>, Arc<JobRepository<S>>) {
        let repo = Arc::new(JobRepository::new(store));
        let executor = Executor::new(
            repo.clone(),
            Arc::new(generator),
            config,
            Arc::new(PipelineStats::default()),
        );
        (InlineDispatcher::new(executor), repo)
    }

    async fn pending_job<S: JobStore>(repo: &JobRepository<S>) -> Job {
        repo.create(NewJob::new("u1", JobInput::new("compare sales", "a,b\n1,2")).unwrap())
            .await
            .unwrap()
    }

    async fn run_with<S: JobStore>(
        store: S,
        generator: ScriptedGenerator,
    ) -> (Result<SyncResult, PipelineError>, Job, Arc<JobRepository<S>>) {
        let (inline, repo) = dispatcher(store, generator, &GenerationConfig::default());
        let job = pending_job(&repo).await;
        let result = inline.run(&job).await;
        (result, job, repo)
    }

    #[tokio::test]
    async fn returns_artifacts_synchronously() {
        let (result, job, repo) =
            run_with(InMemoryJobStore::new(), ScriptedGenerator::well_formed()).await;
        let result = result.unwrap();
        assert_eq!(result.job_id, job.id);
        assert_eq!(result.secondary, "Feb sales doubled Jan.");
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn malformed_reply_is_typed_error_and_failed_job() {
        let (result, job, repo) =
            run_with(InMemoryJobStore::new(), ScriptedGenerator::replying("just prose")).await;
        assert!(matches!(result, Err(PipelineError::MalformedResponse { .. })));
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn service_error_is_reported() {
        let (result, _, _) =
            run_with(InMemoryJobStore::new(), ScriptedGenerator::failing(429, "slow down")).await;
        assert!(matches!(
            result,
            Err(PipelineError::Service { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn store_write_failure_marks_job_failed() {
        let store = FlakyStore::default();
        store.fail_writes_to(JobStatus::Done);
        let (result, job, repo) = run_with(store, ScriptedGenerator::well_formed()).await;
        assert!(matches!(result, Err(PipelineError::Persistence { .. })));
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn generation_timeout_is_transport_error_and_failed_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("too late")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let config = GenerationConfig {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            api_key: "sk-test".into(),
            timeout_ms: 100,
            ..GenerationConfig::default()
        };
        let client = ChatClient::new(&config).unwrap();
        let (inline, repo) = dispatcher(InMemoryJobStore::new(), client, &config);
        let job = pending_job(&repo).await;

        let result = inline.run(&job).await;
        assert!(
            matches!(result, Err(PipelineError::Transport { job_id, .. }) if job_id == job.id),
            "expected transport error, got {result:?}"
        );
        let stored = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.failure_detail.unwrap().starts_with("transport error"));
        assert!(stored.result_primary.is_none());
    }

    #[tokio::test]
    async fn lost_claim_is_a_conflict_not_a_store_failure() {
        let generator = ScriptedGenerator::well_formed();
        let (inline, repo) =
            dispatcher(InMemoryJobStore::new(), generator, &GenerationConfig::default());
        let job = pending_job(&repo).await;
        assert!(
            repo.transition(job.id, JobStatus::Pending, JobStatus::Running, TransitionPayload::Empty)
                .await
                .unwrap()
        );

        let result = inline.run(&job).await;
        let Err(PipelineError::Conflict { job_id, detail }) = result else {
            panic!("expected conflict, got {result:?}");
        };
        assert_eq!(job_id, job.id);
        assert_eq!(detail, "job was already running");
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().status, JobStatus::Running);
    }
}
