use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub resolved: u64,
    pub orphans: u64,
    pub failures_acknowledged: u64,
    pub decode_errors: u64,
    pub store_errors: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
pub(super) struct Counters {
    received: AtomicU64,
    resolved: AtomicU64,
    orphans: AtomicU64,
    failures_acknowledged: AtomicU64,
    decode_errors: AtomicU64,
    store_errors: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    rejected: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub(super) fn received(&self) {
        bump(&self.received);
    }

    pub(super) fn resolved(&self) {
        bump(&self.resolved);
    }

    pub(super) fn orphan(&self) {
        bump(&self.orphans);
    }

    pub(super) fn failure_acknowledged(&self) {
        bump(&self.failures_acknowledged);
    }

    pub(super) fn decode_error(&self) {
        bump(&self.decode_errors);
    }

    pub(super) fn store_error(&self) {
        bump(&self.store_errors);
    }

    pub(super) fn persisted(&self) {
        bump(&self.persisted);
    }

    pub(super) fn persist_failure(&self) {
        bump(&self.persist_failures);
    }

    pub(super) fn rejected(&self) {
        bump(&self.rejected);
    }

    pub(super) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            orphans: self.orphans.load(Ordering::Relaxed),
            failures_acknowledged: self.failures_acknowledged.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
