//! Producer side of the queue path. Messages carry only the job id as UTF-8
//! text; the job row is the source of truth.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::{Broker, BrokerError};
use crate::config::QueueConfig;
use crate::job::JobId;

pub struct QueueProducer<B> {
    broker: Arc<B>,
    config: QueueConfig,
}

impl<B: Broker> QueueProducer<B> {
    pub fn new(broker: Arc<B>, config: QueueConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Declare the durable direct exchange, the durable queue and their
    /// binding. Safe to call repeatedly.
    pub async fn declare_topology(&self) -> Result<(), BrokerError> {
        let QueueConfig {
            exchange,
            queue,
            routing_key,
            ..
        } = &self.config;
        self.broker.declare_exchange(exchange).await?;
        self.broker.declare_queue(queue).await?;
        self.broker.bind_queue(queue, exchange, routing_key).await?;
        info!(%exchange, %queue, %routing_key, "queue topology declared");
        Ok(())
    }

    pub async fn publish(&self, id: JobId) -> Result<(), BrokerError> {
        let body = id.to_string().into_bytes();
        match self
            .broker
            .publish(&self.config.exchange, &self.config.routing_key, body)
            .await
        {
            Ok(()) => {
                info!(job_id = %id, "job published");
                Ok(())
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "publishing job failed");
                Err(e)
            }
        }
    }
}
