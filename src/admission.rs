//! Per-principal admission control.
//!
//! Each key owns an independent token bucket, created lazily on first use and
//! kept for the life of the process. Lookups share a read lock on the key map;
//! the read-modify-write of a single bucket happens under that bucket's own
//! mutex, so unrelated principals never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

/// Bucket shape shared by every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionConfig {
    /// Maximum tokens a bucket holds (burst size).
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Length of one refill period in milliseconds.
    #[serde(default = "default_refill_interval_ms", alias = "refill_interval_ms")]
    pub refill_interval_ms: u64,
    /// Tokens added per elapsed period.
    #[serde(default = "default_refill_amount", alias = "refill_amount")]
    pub refill_amount: u32,
}

fn default_capacity() -> u32 {
    5
}

fn default_refill_interval_ms() -> u64 {
    1000
}

fn default_refill_amount() -> u32 {
    1
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval_ms: default_refill_interval_ms(),
            refill_amount: default_refill_amount(),
        }
    }
}

/// Outcome of [`AdmissionGate::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Reject { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// The caller exceeded its rate; try again later. Not a system fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("admission rejected for {key}, retry after {}ms", retry_after.as_millis())]
pub struct AdmissionRejected {
    pub key: String,
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl Bucket {
    fn full(config: &AdmissionConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &AdmissionConfig, now: Instant) {
        let interval = config.refill_interval();
        if interval.is_zero() {
            self.tokens = config.capacity;
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let periods = elapsed.as_nanos() / interval.as_nanos();
        if periods == 0 {
            return;
        }
        let added = periods.saturating_mul(u128::from(config.refill_amount));
        let tokens = u128::from(self.tokens).saturating_add(added);
        self.tokens = tokens.min(u128::from(config.capacity)) as u32;
        // Keep the partial period so refills stay on the interval grid.
        self.last_refill += interval.saturating_mul(u32::try_from(periods).unwrap_or(u32::MAX));
        if self.tokens == config.capacity {
            self.last_refill = now;
        }
    }

    fn take(&mut self, config: &AdmissionConfig, now: Instant) -> Admission {
        self.refill(config, now);
        if self.tokens > 0 {
            self.tokens -= 1;
            return Admission::Allow;
        }
        let next = self.last_refill + config.refill_interval();
        Admission::Reject {
            retry_after: next.saturating_duration_since(now),
        }
    }
}

impl AdmissionConfig {
    fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

/// Token-bucket rate limiter keyed by principal.
#[derive(Debug)]
pub struct AdmissionGate {
    config: AdmissionConfig,
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
}

impl AdmissionGate {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Take one token from `key`'s bucket. Never blocks on I/O.
    pub fn admit(&self, key: &str) -> Admission {
        let now = Instant::now();
        let bucket = self.bucket(key, now);
        let decision = match bucket.lock() {
            Ok(mut bucket) => bucket.take(&self.config, now),
            Err(poisoned) => poisoned.into_inner().take(&self.config, now),
        };
        if let Admission::Reject { retry_after } = decision {
            debug!(key, retry_after_ms = retry_after.as_millis() as u64, "admission rejected");
        }
        decision
    }

    /// [`admit`](Self::admit) as a `Result`, for `?` at call sites.
    pub fn check(&self, key: &str) -> Result<(), AdmissionRejected> {
        match self.admit(key) {
            Admission::Allow => Ok(()),
            Admission::Reject { retry_after } => Err(AdmissionRejected {
                key: key.to_string(),
                retry_after,
            }),
        }
    }

    /// Number of keys seen so far.
    pub fn tracked_keys(&self) -> usize {
        match self.buckets.read() {
            Ok(buckets) => buckets.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<Bucket>> {
        {
            let buckets = match self.buckets.read() {
                Ok(b) => b,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(bucket) = buckets.get(key) {
                return bucket.clone();
            }
        }
        let mut buckets = match self.buckets.write() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(&self.config, now))))
            .clone()
    }
}
