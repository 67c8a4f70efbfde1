//! The operations exposed to callers, one per execution path, plus polling and
//! operator helpers.
//!
//! Every create path validates input, then asks the admission gate, then
//! persists a `pending` job before handing it to its dispatcher.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::admission::AdmissionGate;
use crate::broker::{Broker, BrokerError};
use crate::config::{ChartwrightConfig, QueueConfig};
use crate::consumer::JobConsumer;
use crate::dispatch::{Executor, InlineDispatcher, PoolStatus, QueueProducer, SyncResult, WorkerPool};
use crate::error::PipelineError;
use crate::job::{Job, JobId, JobInput, JobRepository, JobStatus, JobStore, NewJob, ValidationError};
use crate::llm::Generator;
use crate::stats::{PipelineStats, StatsSnapshot};

pub struct JobService<S, G, B> {
    gate: AdmissionGate,
    repo: Arc<JobRepository<S>>,
    executor: Executor<S, G>,
    inline: InlineDispatcher<S, G>,
    pool: WorkerPool<S, G>,
    producer: QueueProducer<B>,
    broker: Arc<B>,
    stats: Arc<PipelineStats>,
}

impl<S: JobStore, G: Generator, B: Broker> JobService<S, G, B> {
    pub fn new(config: &ChartwrightConfig, store: S, generator: G, broker: Arc<B>) -> Self {
        let repo = Arc::new(JobRepository::new(store));
        let stats = Arc::new(PipelineStats::default());
        let executor = Executor::new(
            repo.clone(),
            Arc::new(generator),
            &config.generation,
            stats.clone(),
        );
        Self {
            gate: AdmissionGate::new(config.admission),
            inline: InlineDispatcher::new(executor.clone()),
            pool: WorkerPool::new(executor.clone(), &config.pool),
            producer: QueueProducer::new(broker.clone(), config.queue.clone()),
            executor,
            repo,
            broker,
            stats,
        }
    }

    pub fn repository(&self) -> &Arc<JobRepository<S>> {
        &self.repo
    }

    fn queue_config(&self) -> &QueueConfig {
        self.producer.config()
    }

    fn admit(&self, owner_id: &str, input: JobInput) -> Result<NewJob, PipelineError> {
        let new = NewJob::new(owner_id, input)?;
        self.gate.check(&new.owner_id)?;
        Ok(new)
    }

    /// Run the job on the calling task and return its artifacts.
    pub async fn create_job_sync(
        &self,
        owner_id: &str,
        input: JobInput,
    ) -> Result<SyncResult, PipelineError> {
        let new = self.admit(owner_id, input)?;
        let job = self.repo.create(new).await?;
        info!(job_id = %job.id, owner = %job.owner_id, "running job inline");
        self.inline.run(&job).await
    }

    /// Hand the job to the worker pool and return its id for polling.
    ///
    /// Pool capacity is reserved before the job is stored, so `Backpressure`
    /// never leaves a `pending` job behind. When the pool is full and the
    /// overflow policy is [`OverflowPolicy::CallerRuns`](crate::config::OverflowPolicy::CallerRuns),
    /// the job runs on this task and the call returns only once it is `done`
    /// or `failed`.
    pub async fn create_job_async(
        &self,
        owner_id: &str,
        input: JobInput,
    ) -> Result<JobId, PipelineError> {
        let new = self.admit(owner_id, input)?;
        let slot = self.pool.try_reserve()?;
        let job = self.repo.create(new).await?;
        let id = job.id;
        info!(job_id = %id, owner = %job.owner_id, "submitting job to worker pool");
        // Completion is observed through the store, not the handle.
        let _ = self.pool.dispatch(slot, job).await;
        Ok(id)
    }

    /// Store the job and publish its id to the durable queue.
    ///
    /// On [`PipelineError::Publish`] the job exists as `pending`; retry with
    /// [`republish`](Self::republish).
    pub async fn create_job_queued(
        &self,
        owner_id: &str,
        input: JobInput,
    ) -> Result<JobId, PipelineError> {
        let new = self.admit(owner_id, input)?;
        let job = self.repo.create(new).await?;
        self.publish(job.id).await?;
        Ok(job.id)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job, PipelineError> {
        self.repo.get(id).await?.ok_or(PipelineError::NotFound(id))
    }

    /// Publish a still-`pending` job again, e.g. after a failed publish.
    pub async fn republish(&self, id: JobId) -> Result<(), PipelineError> {
        let job = self.get_job(id).await?;
        if job.status != JobStatus::Pending {
            warn!(job_id = %id, status = %job.status, "refusing to republish");
            return Err(ValidationError::Other(format!(
                "job {id} is {}; only pending jobs can be republished",
                job.status
            ))
            .into());
        }
        self.publish(id).await
    }

    async fn publish(&self, id: JobId) -> Result<(), PipelineError> {
        self.producer
            .publish(id)
            .await
            .map_err(|source| PipelineError::Publish { job_id: id, source })
    }

    pub async fn declare_topology(&self) -> Result<(), BrokerError> {
        self.producer.declare_topology().await
    }

    /// Declare the queue topology and spawn the configured number of consumers.
    pub async fn start_consumers(
        &self,
    ) -> Result<Vec<JoinHandle<Result<(), BrokerError>>>, BrokerError> {
        self.declare_topology().await?;
        let queue = &self.queue_config().queue;
        let handles = (0..self.queue_config().consumers)
            .map(|_| {
                JobConsumer::new(self.executor.clone(), self.broker.clone(), queue.clone()).spawn()
            })
            .collect::<Vec<_>>();
        info!(%queue, consumers = handles.len(), "queue consumers started");
        Ok(handles)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }
}
