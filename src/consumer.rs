//! Queue consumer: turns deliveries into job executions and settles each
//! delivery by hand once the job's own row records what happened.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, BrokerError, Delivery, DeliveryStream};
use crate::dispatch::{ExecutionOutcome, Executor};
use crate::job::{JobId, JobStore};
use crate::llm::Generator;
use crate::stats::PipelineStats;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected { requeue: bool },
}

pub struct JobConsumer<S, G, B> {
    executor: Executor<S, G>,
    broker: Arc<B>,
    queue: String,
}

impl<S, G, B> Clone for JobConsumer<S, G, B> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            broker: self.broker.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<S: JobStore, G: Generator, B: Broker> JobConsumer<S, G, B> {
    pub fn new(executor: Executor<S, G>, broker: Arc<B>, queue: impl Into<String>) -> Self {
        Self {
            executor,
            broker,
            queue: queue.into(),
        }
    }

    fn stats(&self) -> &PipelineStats {
        self.executor.stats()
    }

    /// Drain the queue one delivery at a time until the subscription ends.
    pub async fn run(self) -> Result<(), BrokerError> {
        let mut stream = self.broker.consume(&self.queue).await?;
        info!(queue = %self.queue, "consumer started");
        while let Some(delivery) = stream.next().await {
            self.handle(&delivery).await;
        }
        info!(queue = %self.queue, "consumer stopped");
        Ok(())
    }

    pub fn spawn(self) -> JoinHandle<Result<(), BrokerError>> {
        tokio::spawn(self.run())
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle(&self, delivery: &Delivery) -> Settlement {
        let settlement = self.process(delivery).await;
        let tag = delivery.tag;
        let result = match settlement {
            Settlement::Acked => self.broker.ack(tag).await,
            Settlement::Rejected { requeue } => self.broker.reject(tag, requeue).await,
        };
        match result {
            Ok(()) => match settlement {
                Settlement::Acked => self.stats().record_ack(),
                Settlement::Rejected { .. } => self.stats().record_reject(),
            },
            // The broker will redeliver anything left unsettled.
            Err(e) => warn!(delivery_tag = %tag, error = %e, "settling delivery failed"),
        }
        settlement
    }

    async fn process(&self, delivery: &Delivery) -> Settlement {
        const DROP: Settlement = Settlement::Rejected { requeue: false };
        let tag = delivery.tag;

        let Some(id) = parse_job_id(&delivery.body) else {
            warn!(delivery_tag = %tag, "unreadable job id, dropping delivery");
            return DROP;
        };

        let job = match self.executor.repository().get(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(delivery_tag = %tag, job_id = %id, "job not found, dropping delivery");
                return DROP;
            }
            Err(e) => {
                error!(delivery_tag = %tag, job_id = %id, error = %e, "could not load job");
                return DROP;
            }
        };

        debug!(
            delivery_tag = %tag,
            job_id = %id,
            redelivered = delivery.redelivered,
            "processing delivery"
        );

        match self.executor.execute(&job).await {
            ExecutionOutcome::Done(_) | ExecutionOutcome::Failed(_) | ExecutionOutcome::Superseded => {
                Settlement::Acked
            }
            // A finished job already holds its outcome; the message is spent.
            ExecutionOutcome::Duplicate {
                observed: Some(status),
            } if status.is_terminal() => {
                info!(delivery_tag = %tag, job_id = %id, %status, "redelivered finished job");
                Settlement::Acked
            }
            ExecutionOutcome::Duplicate { observed } => {
                warn!(delivery_tag = %tag, job_id = %id, ?observed, "job is held by another worker");
                DROP
            }
            ExecutionOutcome::ClaimError(_) => {
                warn!(delivery_tag = %tag, job_id = %id, "claim failed, job stays pending");
                DROP
            }
            ExecutionOutcome::Orphaned(_) => DROP,
        }
    }
}

fn parse_job_id(body: &[u8]) -> Option<JobId> {
    let text = std::str::from_utf8(body).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    text.parse().ok()
}
