//! Bounded worker pool for the fire-and-poll async path.
//!
//! Capacity is two semaphores: `slots` (workers + backlog) admits work and
//! is taken without waiting, `workers` limits how many jobs execute at once.
//! A submission that finds no free slot either fails with [`Backpressure`] or,
//! under [`OverflowPolicy::CallerRuns`], executes on the submitting task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::executor::{ExecutionOutcome, Executor};
use crate::config::{OverflowPolicy, PoolConfig};
use crate::job::{Job, JobStore};
use crate::llm::Generator;

/// The pool is saturated; slow down or retry later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("worker pool saturated ({workers} workers, backlog {backlog})")]
pub struct Backpressure {
    pub workers: usize,
    pub backlog: usize,
}

/// Capacity reserved ahead of creating a job, so a saturated pool never
/// leaves a `pending` job behind.
#[derive(Debug)]
pub enum PoolSlot {
    Reserved(OwnedSemaphorePermit),
    CallerRuns,
}

/// Handle to submitted work. Completion is observed through the job store;
/// awaiting this is optional.
#[derive(Debug)]
pub enum Submission {
    Queued(JoinHandle<ExecutionOutcome>),
    RanInline(ExecutionOutcome),
}

impl Submission {
    /// Wait for the worker. `None` if the task panicked or was aborted.
    pub async fn wait(self) -> Option<ExecutionOutcome> {
        match self {
            Submission::Queued(handle) => handle.await.ok(),
            Submission::RanInline(outcome) => Some(outcome),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub workers: usize,
    pub backlog: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
}

pub struct WorkerPool<S, G> {
    executor: Executor<S, G>,
    workers: usize,
    backlog: usize,
    overflow: OverflowPolicy,
    slots: Arc<Semaphore>,
    running: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
}

impl<S: JobStore, G: Generator> WorkerPool<S, G> {
    pub fn new(executor: Executor<S, G>, config: &PoolConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            executor,
            workers,
            backlog: config.backlog,
            overflow: config.overflow,
            slots: Arc::new(Semaphore::new(workers + config.backlog)),
            running: Arc::new(Semaphore::new(workers)),
            active: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reserve capacity without waiting.
    pub fn try_reserve(&self) -> Result<PoolSlot, Backpressure> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(PoolSlot::Reserved(permit)),
            Err(_) => match self.overflow {
                OverflowPolicy::Reject => {
                    warn!(workers = self.workers, backlog = self.backlog, "worker pool saturated");
                    Err(Backpressure {
                        workers: self.workers,
                        backlog: self.backlog,
                    })
                }
                OverflowPolicy::CallerRuns => Ok(PoolSlot::CallerRuns),
            },
        }
    }

    /// Run `job` using a slot from [`try_reserve`](Self::try_reserve).
    pub async fn dispatch(&self, slot: PoolSlot, job: Job) -> Submission {
        match slot {
            PoolSlot::Reserved(permit) => {
                let executor = self.executor.clone();
                let running = self.running.clone();
                let active = self.active.clone();
                let completed = self.completed.clone();
                debug!(job_id = %job.id, "job queued on worker pool");
                let handle = tokio::spawn(async move {
                    let _slot = permit;
                    // The semaphore is never closed, so this only waits.
                    let _worker = running.acquire_owned().await.ok();
                    active.fetch_add(1, Ordering::SeqCst);
                    let outcome = executor.execute(&job).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    outcome
                });
                Submission::Queued(handle)
            }
            PoolSlot::CallerRuns => {
                debug!(job_id = %job.id, "worker pool saturated, running job on caller");
                Submission::RanInline(self.executor.execute(&job).await)
            }
        }
    }

    /// Reserve and dispatch in one step.
    pub async fn submit(&self, job: Job) -> Result<Submission, Backpressure> {
        let slot = self.try_reserve()?;
        Ok(self.dispatch(slot, job).await)
    }

    pub fn status(&self) -> PoolStatus {
        let in_flight = (self.workers + self.backlog).saturating_sub(self.slots.available_permits());
        let active = self.active.load(Ordering::SeqCst);
        PoolStatus {
            workers: self.workers,
            backlog: self.backlog,
            active,
            queued: in_flight.saturating_sub(active),
            completed: self.completed.load(Ordering::SeqCst),
        }
    }
}
