//! Test doubles shared by the dispatcher, consumer and service tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::job::{
    InMemoryJobStore, Job, JobId, JobRepository, JobStatus, JobStore, StatusUpdate, StoreError,
};
use crate::llm::{GenerationError, Generator};

pub const WELL_FORMED: &str =
    "Here you go\n【】【】【】【】\n{\"series\": [{\"type\": \"bar\"}]}\n【】【】【】【】\nFeb sales doubled Jan.";

enum Reply {
    Text(String),
    Service(u16, String),
}

/// Generator with a fixed reply, optionally held until a permit is released.
pub struct ScriptedGenerator {
    reply: Reply,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Reply::Text(text.to_string()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn well_formed() -> Self {
        Self::replying(WELL_FORMED)
    }

    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            reply: Reply::Service(status, message.to_string()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Each call waits for one permit of `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Generator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Service(status, message) => Err(GenerationError::Service {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

/// In-memory store whose operations can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryJobStore,
    fail_insert: AtomicBool,
    fail_fetch: AtomicBool,
    fail_writes_to: Mutex<Vec<JobStatus>>,
}

impl FlakyStore {
    pub fn fail_inserts(&self) {
        self.fail_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// Make every compare-and-set targeting `status` fail with an outage.
    pub fn fail_writes_to(&self, status: JobStatus) {
        if let Ok(mut statuses) = self.fail_writes_to.lock() {
            statuses.push(status);
        }
    }

    fn outage() -> StoreError {
        StoreError::Unavailable("simulated outage".into())
    }
}

impl JobStore for FlakyStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.insert(job).await
    }

    async fn fetch(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.fetch(id).await
    }

    async fn compare_and_set(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> Result<bool, StoreError> {
        let failing = self
            .fail_writes_to
            .lock()
            .map(|s| s.contains(&update.status))
            .unwrap_or(false);
        if failing {
            return Err(Self::outage());
        }
        self.inner.compare_and_set(id, expected, update).await
    }
}

/// Poll until the job reaches `status` or panic after a few seconds.
pub async fn wait_for_status<S: JobStore>(
    repo: &JobRepository<S>,
    id: JobId,
    status: JobStatus,
) -> Job {
    for _ in 0..500 {
        if let Some(job) = repo.get(id).await.unwrap()
            && job.status == status
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {status}");
}
