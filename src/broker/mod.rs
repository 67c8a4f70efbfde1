//! Durable-queue contract used by the queue path.
//!
//! Modelled on an AMQP direct exchange: published bodies reach the queues
//! bound with a matching routing key. Consumers receive [`Delivery`]s and must settle each one
//! explicitly with [`Broker::ack`] or [`Broker::reject`]. There is no
//! auto-ack mode.

mod memory;

use std::fmt;
use std::future::Future;

pub use memory::{InMemoryBroker, InMemoryConsumer};

/// Broker-assigned identifier of one delivery, unique per broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    /// Set when this message was delivered before and not acknowledged.
    pub redelivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    #[error("no queue bound to exchange {exchange} for routing key {routing_key}")]
    Unroutable { exchange: String, routing_key: String },
    #[error("unknown delivery tag: {0}")]
    UnknownDelivery(DeliveryTag),
}

/// A message broker connection.
pub trait Broker: Send + Sync + 'static {
    type Stream: DeliveryStream;

    /// Declare a durable direct exchange. Idempotent.
    fn declare_exchange(&self, name: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Declare a durable queue. Idempotent.
    fn declare_queue(&self, name: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publish persistently. Fails with [`BrokerError::Unroutable`] rather than
    /// dropping a message no queue would receive.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Subscribe to `queue` in manual-acknowledgment mode.
    fn consume(&self, queue: &str) -> impl Future<Output = Result<Self::Stream, BrokerError>> + Send;

    fn ack(&self, tag: DeliveryTag) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Settle negatively. With `requeue` the message returns to its queue
    /// marked redelivered; without it the message is discarded.
    fn reject(
        &self,
        tag: DeliveryTag,
        requeue: bool,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// Deliveries for one subscription. `None` once the subscription ends.
pub trait DeliveryStream: Send + 'static {
    fn next(&mut self) -> impl Future<Output = Option<Delivery>> + Send;
}
