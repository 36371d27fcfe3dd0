//! Correlation store: job id → pending job context.
//!
//! ## Entry lifecycle
//!
//! ```text
//! put ──► Pending ──release/claim──► Released ──residual TTL──► gone
//!            │
//!            └──────────── TTL (no notification ever arrived) ──► gone
//! ```
//!
//! A released entry is kept for a short residual TTL instead of being deleted,
//! so a duplicate notification arriving right after release observes "already
//! handled" rather than racing a delete. Released entries are invisible to
//! `get` and `claim`.
//!
//! Orphaned entries (no notification) are never resurrected or retried; they
//! simply expire.

mod clock;
mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use clock::{Clock, ManualClock, SystemClock};
pub use in_memory::InMemoryCorrelationStore;
#[cfg(feature = "redis")]
pub use redis::RedisCorrelationStore;

use std::sync::Arc;
use std::time::Duration;

use jobrelay_core::JobId;

/// Default residual TTL applied on release.
pub const DEFAULT_RELEASE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("correlation store unavailable: {0}")]
    Unavailable(String),
}

/// Entry state tracked alongside the context bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Released,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Released => "released",
        }
    }
}

/// Byte-oriented, TTL-bounded key/value store keyed by job id.
pub trait CorrelationStore: Send + Sync {
    /// Store `context` under `job_id` for `ttl`, replacing any prior entry.
    fn put(&self, job_id: &JobId, context: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Pure lookup of a pending entry.
    fn get(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Mark the entry released and shorten its TTL. Idempotent.
    fn release(&self, job_id: &JobId) -> Result<(), StoreError>;

    /// Atomically read a pending entry and release it.
    ///
    /// Among concurrent callers for the same job, at most one gets `Some`.
    fn claim(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Drop expired entries and return how many were removed.
    ///
    /// Stores with native key expiry have nothing to do here.
    fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

impl<S> CorrelationStore for Arc<S>
where
    S: CorrelationStore + ?Sized,
{
    fn put(&self, job_id: &JobId, context: &[u8], ttl: Duration) -> Result<(), StoreError> {
        (**self).put(job_id, context, ttl)
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(job_id)
    }

    fn release(&self, job_id: &JobId) -> Result<(), StoreError> {
        (**self).release(job_id)
    }

    fn claim(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).claim(job_id)
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        (**self).purge_expired()
    }
}
