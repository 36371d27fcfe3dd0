//! In-memory correlation store for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use jobrelay_core::JobId;

use super::{
    Clock, CorrelationStore, DEFAULT_RELEASE_TTL, EntryState, StoreError, SystemClock,
};

#[derive(Debug, Clone)]
struct StoredEntry {
    context: Vec<u8>,
    state: EntryState,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.state == EntryState::Pending && self.is_live(now)
    }

    /// Flip to released, shortening (never extending) the remaining lifetime.
    fn release(&mut self, now: DateTime<Utc>, residual: Duration) {
        let residual_deadline = deadline(now, residual);
        self.state = EntryState::Released;
        if residual_deadline < self.expires_at {
            self.expires_at = residual_deadline;
        }
    }
}

/// `now + ttl`, saturating at the far future.
fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Every this many `put`s, expired entries are swept while the write lock is held.
const SWEEP_EVERY_PUTS: u64 = 1024;

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory correlation store lock poisoned".to_string())
}

/// `RwLock<HashMap>`-backed store.
///
/// Expired entries are evicted when a write touches their key, swept every
/// `SWEEP_EVERY_PUTS` puts, and dropped by `CorrelationStore::purge_expired`.
#[derive(Debug)]
pub struct InMemoryCorrelationStore {
    entries: RwLock<HashMap<JobId, StoredEntry>>,
    puts: AtomicU64,
    release_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            puts: AtomicU64::new(0),
            release_ttl: DEFAULT_RELEASE_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_release_ttl(mut self, release_ttl: Duration) -> Self {
        self.release_ttl = release_ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// State of the entry for `job_id`, if it has not expired yet.
    pub fn state(&self, job_id: &JobId) -> Option<EntryState> {
        let now = self.clock.now();
        let entries = self.entries.read().ok()?;
        entries
            .get(job_id)
            .filter(|e| e.is_live(now))
            .map(|e| e.state)
    }

    /// Number of unexpired entries (pending and released).
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries physically held, including expired ones not yet evicted.
    pub fn held(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }
}

fn sweep(entries: &mut HashMap<JobId, StoredEntry>, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.is_live(now));
    let removed = before - entries.len();
    if removed > 0 {
        debug!(removed, "purged expired correlation entries");
    }
    removed
}

/// Remove the entry for `job_id` if it has expired.
fn evict_if_expired(entries: &mut HashMap<JobId, StoredEntry>, job_id: &JobId, now: DateTime<Utc>) {
    if entries.get(job_id).is_some_and(|e| !e.is_live(now)) {
        entries.remove(job_id);
    }
}

impl Default for InMemoryCorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationStore for InMemoryCorrelationStore {
    fn put(&self, job_id: &JobId, context: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        if (self.puts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY_PUTS == 0 {
            sweep(&mut entries, now);
        }

        let entry = StoredEntry {
            context: context.to_vec(),
            state: EntryState::Pending,
            expires_at: deadline(now, ttl),
        };

        if let Some(previous) = entries.insert(job_id.clone(), entry) {
            if previous.is_pending(now) {
                warn!(job_id = %job_id, "replaced an in-flight correlation entry");
            }
        }

        Ok(())
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(job_id)
            .filter(|e| e.is_pending(now))
            .map(|e| e.context.clone()))
    }

    fn release(&self, job_id: &JobId) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        evict_if_expired(&mut entries, job_id, now);

        if let Some(entry) = entries.get_mut(job_id) {
            if entry.is_pending(now) {
                entry.release(now, self.release_ttl);
            }
        }

        Ok(())
    }

    fn claim(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        evict_if_expired(&mut entries, job_id, now);

        match entries.get_mut(job_id) {
            Some(entry) if entry.is_pending(now) => {
                entry.release(now, self.release_ttl);
                Ok(Some(entry.context.clone()))
            }
            _ => Ok(None),
        }
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(sweep(&mut entries, now))
    }
}
