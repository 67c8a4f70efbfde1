use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide pipeline counters, shared by dispatchers and consumers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    done: AtomicU64,
    failed: AtomicU64,
    duplicate_claims: AtomicU64,
    claim_errors: AtomicU64,
    orphaned: AtomicU64,
    acked: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub done: u64,
    pub failed: u64,
    pub duplicate_claims: u64,
    pub claim_errors: u64,
    /// Jobs left `running` because their terminal write failed.
    pub orphaned: u64,
    pub acked: u64,
    pub rejected: u64,
}

impl PipelineStats {
    pub fn record_done(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_claim(&self) {
        self.duplicate_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim_error(&self) {
        self.claim_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphan(&self) {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            done: self.done.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicate_claims: self.duplicate_claims.load(Ordering::Relaxed),
            claim_errors: self.claim_errors.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
