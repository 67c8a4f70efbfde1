//! In-process stand-in for the durable queue service, used by tests and the
//! CLI.
//!
//! Unacknowledged deliveries are tracked per tag. [`InMemoryBroker::recover`]
//! returns every one of them to its queue marked redelivered, as a broker
//! does when a consumer's channel drops.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use super::{Broker, BrokerError, Delivery, DeliveryStream, DeliveryTag};

#[derive(Debug, Clone)]
struct Message {
    body: Vec<u8>,
    redelivered: bool,
}

/// Bindings of a direct exchange as `(routing key, queue)` pairs.
type Bindings = Vec<(String, String)>;

#[derive(Debug)]
struct Unacked {
    queue: String,
    message: Message,
}

#[derive(Debug)]
struct State {
    available: bool,
    closed: bool,
    exchanges: HashMap<String, Bindings>,
    queues: HashMap<String, VecDeque<Message>>,
    unacked: HashMap<DeliveryTag, Unacked>,
    next_tag: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    available: true,
                    closed: false,
                    exchanges: HashMap::new(),
                    queues: HashMap::new(),
                    unacked: HashMap::new(),
                    next_tag: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        self.shared
            .state
            .lock()
            .map_err(|_| BrokerError::Unavailable("broker state lock poisoned".into()))
    }

    /// Toggle availability; while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state() {
            state.available = available;
        }
    }

    /// End every subscription. Pending messages stay queued.
    pub fn close(&self) {
        if let Ok(mut state) = self.state() {
            state.closed = true;
        }
        self.shared.notify.notify_waiters();
    }

    /// Requeue every unacknowledged delivery, oldest first, marked
    /// redelivered.
    pub fn recover(&self) {
        if let Ok(mut state) = self.state() {
            let State { queues, unacked, .. } = &mut *state;
            let mut returned: Vec<_> = unacked.drain().collect();
            returned.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
            for (_, entry) in returned {
                if let Some(ready) = queues.get_mut(&entry.queue) {
                    ready.push_front(Message {
                        redelivered: true,
                        ..entry.message
                    });
                }
            }
        }
        self.shared.notify.notify_waiters();
    }

    /// Messages waiting in `queue`.
    pub fn ready_count(&self, queue: &str) -> usize {
        self.state()
            .ok()
            .and_then(|s| s.queues.get(queue).map(VecDeque::len))
            .unwrap_or(0)
    }

    /// Deliveries handed out and not yet settled.
    pub fn unacked_count(&self) -> usize {
        self.state().map(|s| s.unacked.len()).unwrap_or(0)
    }

    fn check_available(state: &State) -> Result<(), BrokerError> {
        if state.available {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("connection refused".into()))
        }
    }
}

impl Broker for InMemoryBroker {
    type Stream = InMemoryConsumer;

    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.state()?;
        Self::check_available(&state)?;
        state.exchanges.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.state()?;
        Self::check_available(&state)?;
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut state = self.state()?;
        Self::check_available(&state)?;
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }
        let bindings = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
        let binding = (routing_key.to_string(), queue.to_string());
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<(), BrokerError> {
        {
            let mut state = self.state()?;
            Self::check_available(&state)?;
            let State {
                exchanges, queues, ..
            } = &mut *state;
            let bindings = exchanges
                .get(exchange)
                .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;

            let targets: Vec<&str> = bindings
                .iter()
                .filter(|(key, _)| key == routing_key)
                .map(|(_, queue)| queue.as_str())
                .collect();
            if targets.is_empty() {
                return Err(BrokerError::Unroutable {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                });
            }
            for target in targets {
                if let Some(ready) = queues.get_mut(target) {
                    ready.push_back(Message {
                        body: body.clone(),
                        redelivered: false,
                    });
                }
            }
        }
        debug!(exchange, routing_key, "message published");
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<InMemoryConsumer, BrokerError> {
        let state = self.state()?;
        Self::check_available(&state)?;
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }
        Ok(InMemoryConsumer {
            broker: self.clone(),
            queue: queue.to_string(),
        })
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        let mut state = self.state()?;
        Self::check_available(&state)?;
        state
            .unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownDelivery(tag))
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        {
            let mut state = self.state()?;
            Self::check_available(&state)?;
            let entry = state
                .unacked
                .remove(&tag)
                .ok_or(BrokerError::UnknownDelivery(tag))?;
            if !requeue {
                return Ok(());
            }
            if let Some(ready) = state.queues.get_mut(&entry.queue) {
                ready.push_front(Message {
                    redelivered: true,
                    ..entry.message
                });
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

/// Subscription to one queue of an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    queue: String,
}

impl InMemoryConsumer {
    fn try_take(&self) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.broker.state()?;
        if state.closed {
            return Err(BrokerError::Unavailable("broker closed".into()));
        }
        let State {
            queues,
            unacked,
            next_tag,
            ..
        } = &mut *state;
        let ready = queues
            .get_mut(&self.queue)
            .ok_or_else(|| BrokerError::UnknownQueue(self.queue.clone()))?;
        let Some(message) = ready.pop_front() else {
            return Ok(None);
        };
        *next_tag += 1;
        let tag = DeliveryTag(*next_tag);
        let delivery = Delivery {
            tag,
            body: message.body.clone(),
            redelivered: message.redelivered,
        };
        unacked.insert(
            tag,
            Unacked {
                queue: self.queue.clone(),
                message,
            },
        );
        Ok(Some(delivery))
    }
}

impl DeliveryStream for InMemoryConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        let shared = self.broker.shared.clone();
        loop {
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_take() {
                Ok(Some(delivery)) => return Some(delivery),
                Ok(None) => {}
                Err(err) => {
                    debug!(queue = %self.queue, error = %err, "subscription ended");
                    return None;
                }
            }
            notified.await;
        }
    }
}
