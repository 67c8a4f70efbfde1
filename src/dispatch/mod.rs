//! Ways of running a job: inline on the caller, on a bounded worker pool, or
//! through a durable queue drained by [`crate::consumer::JobConsumer`].

pub mod executor;
pub mod inline;
pub mod pool;
pub mod queue;

pub use executor::{ExecutionOutcome, Executor, FailureReason};
pub use inline::{InlineDispatcher, SyncResult};
pub use pool::{Backpressure, PoolSlot, PoolStatus, Submission, WorkerPool};
pub use queue::QueueProducer;
