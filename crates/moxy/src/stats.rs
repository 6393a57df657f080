//! Atomic dispatch counters.
//!
//! All atomics use `Relaxed` ordering: these are monotonic display counters
//! with no synchronization requirements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Default)]
struct StatsInner {
    dispatched: AtomicU64,
    mocked: AtomicU64,
    forwarded: AtomicU64,
    not_found: AtomicU64,
    failed: AtomicU64,
}

/// Thread-safe dispatch statistics. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct DispatchStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current counter values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub dispatched: u64,
    pub mocked: u64,
    pub forwarded: u64,
    pub not_found: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_dispatched(&self) {
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_mocked(&self) {
        self.inner.mocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forwarded(&self) {
        self.inner.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_not_found(&self) {
        self.inner.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            mocked: self.inner.mocked.load(Ordering::Relaxed),
            forwarded: self.inner.forwarded.load(Ordering::Relaxed),
            not_found: self.inner.not_found.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}
