//! Redis-backed correlation store (durable across process restarts).
//!
//! ## Layout
//!
//! - **Key**: `{prefix}:{job_id}` (one hash per job)
//! - **Fields**: `state` (`pending` | `released`), `context` (raw bytes)
//! - **TTL**: native key expiry (`EXPIRE`)
//!
//! `release` and `claim` run as Lua scripts so the state check, the state flip
//! and the TTL shortening happen atomically on the server.

use std::sync::Arc;
use std::time::Duration;

use redis::Script;
use tracing::{debug, instrument, warn};

use jobrelay_core::JobId;

use super::{CorrelationStore, DEFAULT_RELEASE_TTL, EntryState, StoreError};

/// Default key prefix.
const DEFAULT_KEY_PREFIX: &str = "jobrelay:correlation";

/// Flip a pending entry to released and shorten (never extend) its TTL.
/// Returns the context when the caller won the flip, nil otherwise.
const CLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'pending' then
  return false
end
local ctx = redis.call('HGET', KEYS[1], 'context')
redis.call('HSET', KEYS[1], 'state', 'released')
local ttl = redis.call('TTL', KEYS[1])
local residual = tonumber(ARGV[1])
if ttl < 0 or ttl > residual then
  redis.call('EXPIRE', KEYS[1], residual)
end
return ctx
"#;

#[derive(Debug, Clone)]
pub struct RedisCorrelationStore {
    client: Arc<redis::Client>,
    key_prefix: String,
    release_ttl: Duration,
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Redis expiry has second granularity and rejects zero.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisCorrelationStore {
    /// Create a store for `redis_url` (e.g. "redis://localhost:6379").
    pub fn new(redis_url: impl AsRef<str>, key_prefix: Option<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(unavailable)?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            release_ttl: DEFAULT_RELEASE_TTL,
        })
    }

    pub fn with_release_ttl(mut self, release_ttl: Duration) -> Self {
        self.release_ttl = release_ttl;
        self
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.key_prefix, job_id)
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client.get_connection().map_err(unavailable)
    }

    fn run_claim(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection()?;
        Script::new(CLAIM_SCRIPT)
            .key(self.key(job_id))
            .arg(ttl_secs(self.release_ttl))
            .invoke::<Option<Vec<u8>>>(&mut conn)
            .map_err(unavailable)
    }
}

impl CorrelationStore for RedisCorrelationStore {
    #[instrument(skip(self, context), fields(job_id = %job_id, bytes = context.len()))]
    fn put(&self, job_id: &JobId, context: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let key = self.key(job_id);

        let (previous,): (Option<String>,) = redis::pipe()
            .atomic()
            .cmd("HGET")
            .arg(&key)
            .arg("state")
            .cmd("DEL")
            .arg(&key)
            .ignore()
            .cmd("HSET")
            .arg(&key)
            .arg("state")
            .arg(EntryState::Pending.as_str())
            .arg("context")
            .arg(context)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(ttl))
            .ignore()
            .query(&mut conn)
            .map_err(unavailable)?;

        if previous.as_deref() == Some(EntryState::Pending.as_str()) {
            warn!(job_id = %job_id, "replaced an in-flight correlation entry");
        }
        debug!("stored correlation entry");
        Ok(())
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection()?;

        let (state, context): (Option<String>, Option<Vec<u8>>) = redis::cmd("HMGET")
            .arg(self.key(job_id))
            .arg("state")
            .arg("context")
            .query(&mut conn)
            .map_err(unavailable)?;

        match state.as_deref() {
            Some(s) if s == EntryState::Pending.as_str() => Ok(context),
            _ => Ok(None),
        }
    }

    fn release(&self, job_id: &JobId) -> Result<(), StoreError> {
        self.run_claim(job_id).map(|_| ())
    }

    fn claim(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        self.run_claim(job_id)
    }
}

/// Live tests against a real server. Run with
/// `JOBRELAY_REDIS_URL=redis://localhost:6379 cargo test --features redis -- --ignored`.
#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    fn job(id: &str) -> JobId {
        JobId::new(id).unwrap()
    }

    /// Store under a fresh prefix so runs never see each other's keys.
    fn live_store(release_ttl: Duration) -> Option<RedisCorrelationStore> {
        let url = std::env::var("JOBRELAY_REDIS_URL").ok()?;
        let prefix = format!("jobrelay:test:{}", uuid::Uuid::now_v7());
        Some(
            RedisCorrelationStore::new(url, Some(prefix))
                .unwrap()
                .with_release_ttl(release_ttl),
        )
    }

    fn remaining_ttl(store: &RedisCorrelationStore, job_id: &JobId) -> i64 {
        let mut conn = store.connection().unwrap();
        redis::cmd("TTL").arg(store.key(job_id)).query(&mut conn).unwrap()
    }

    #[test]
    #[ignore = "requires JOBRELAY_REDIS_URL"]
    fn entry_is_visible_until_ttl_elapses() {
        let Some(store) = live_store(Duration::from_secs(30)) else { return };
        store.put(&job("j1"), b"ctx", Duration::from_secs(1)).unwrap();

        assert_eq!(store.get(&job("j1")).unwrap(), Some(b"ctx".to_vec()));
        assert_eq!(store.get(&job("j1")).unwrap(), Some(b"ctx".to_vec()));

        thread::sleep(Duration::from_millis(2100));
        assert_eq!(store.get(&job("j1")).unwrap(), None);
        assert_eq!(store.claim(&job("j1")).unwrap(), None);
    }

    #[test]
    #[ignore = "requires JOBRELAY_REDIS_URL"]
    fn release_hides_entry_and_shortens_ttl() {
        let Some(store) = live_store(Duration::from_secs(30)) else { return };
        store.put(&job("j1"), b"ctx", Duration::from_secs(3600)).unwrap();

        store.release(&job("j1")).unwrap();
        store.release(&job("j1")).unwrap();

        assert_eq!(store.get(&job("j1")).unwrap(), None);
        assert_eq!(store.claim(&job("j1")).unwrap(), None);
        let ttl = remaining_ttl(&store, &job("j1"));
        assert!((1..=30).contains(&ttl), "ttl was {ttl}");
    }

    #[test]
    #[ignore = "requires JOBRELAY_REDIS_URL"]
    fn release_never_extends_a_short_ttl() {
        let Some(store) = live_store(Duration::from_secs(60)) else { return };
        store.put(&job("j1"), b"ctx", Duration::from_secs(5)).unwrap();

        assert_eq!(store.claim(&job("j1")).unwrap(), Some(b"ctx".to_vec()));
        assert!(remaining_ttl(&store, &job("j1")) <= 5);
    }

    #[test]
    #[ignore = "requires JOBRELAY_REDIS_URL"]
    fn claim_of_missing_key_is_none() {
        let Some(store) = live_store(Duration::from_secs(30)) else { return };
        assert_eq!(store.claim(&job("never-stored")).unwrap(), None);
        store.release(&job("never-stored")).unwrap();
        assert_eq!(remaining_ttl(&store, &job("never-stored")), -2);
    }

    #[test]
    #[ignore = "requires JOBRELAY_REDIS_URL"]
    fn put_replaces_a_released_entry() {
        let Some(store) = live_store(Duration::from_secs(30)) else { return };
        store.put(&job("j1"), b"old", Duration::from_secs(60)).unwrap();
        store.claim(&job("j1")).unwrap();

        store.put(&job("j1"), b"new", Duration::from_secs(60)).unwrap();
        assert_eq!(store.get(&job("j1")).unwrap(), Some(b"new".to_vec()));
        assert!(remaining_ttl(&store, &job("j1")) > 30);
    }

    #[test]
    #[ignore = "requires JOBRELAY_REDIS_URL"]
    fn concurrent_claims_have_a_single_winner() {
        let Some(store) = live_store(Duration::from_secs(30)) else { return };
        let store = Arc::new(store);
        store.put(&job("race"), b"ctx", Duration::from_secs(60)).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.claim(&job("race")).unwrap().is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
