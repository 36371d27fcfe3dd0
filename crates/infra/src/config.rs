//! Engine configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `JOBRELAY_CORRELATION_TTL_SECS` | `86400` |
//! | `JOBRELAY_RELEASE_TTL_SECS` | `60` |
//! | `JOBRELAY_RELEASE_MODE` | `atomic` (or `get_then_release`) |
//! | `JOBRELAY_DISPATCH_CONCURRENCY` | `4` |
//! | `JOBRELAY_SWEEP_INTERVAL_SECS` | `60` |
//! | `JOBRELAY_REDIS_URL` | unset (in-memory correlation store) |
//! | `JOBRELAY_KEY_PREFIX` | `jobrelay:correlation` |
//! | `DATABASE_URL` | unset (a persister must be supplied to the builder) |

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::correlation::DEFAULT_RELEASE_TTL;
use crate::dispatch::ReleaseMode;
use crate::submit::{DEFAULT_CORRELATION_TTL, RetryPolicy};

pub const DEFAULT_KEY_PREFIX: &str = "jobrelay:correlation";
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 4;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub correlation_ttl: Duration,
    pub release_ttl: Duration,
    pub release_mode: ReleaseMode,
    pub dispatch_concurrency: usize,
    /// How often expired correlation entries are purged from stores without native expiry.
    pub sweep_interval: Duration,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub database_url: Option<String>,
    pub submission_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            correlation_ttl: DEFAULT_CORRELATION_TTL,
            release_ttl: DEFAULT_RELEASE_TTL,
            release_mode: ReleaseMode::default(),
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            database_url: None,
            submission_retry: RetryPolicy::default(),
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(key, value, e.to_string()))?;
    if secs == 0 {
        return Err(invalid(key, value, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

impl EngineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JOBRELAY_CORRELATION_TTL_SECS") {
            config.correlation_ttl = parse_secs("JOBRELAY_CORRELATION_TTL_SECS", &v)?;
        }

        if let Some(v) = get("JOBRELAY_RELEASE_TTL_SECS") {
            config.release_ttl = parse_secs("JOBRELAY_RELEASE_TTL_SECS", &v)?;
        }

        if let Some(v) = get("JOBRELAY_RELEASE_MODE") {
            config.release_mode = v
                .parse()
                .map_err(|reason: String| invalid("JOBRELAY_RELEASE_MODE", &v, reason))?;
        }

        if let Some(v) = get("JOBRELAY_DISPATCH_CONCURRENCY") {
            let n: usize = v.trim().parse().map_err(|e: std::num::ParseIntError| {
                invalid("JOBRELAY_DISPATCH_CONCURRENCY", &v, e.to_string())
            })?;
            if n == 0 {
                return Err(invalid("JOBRELAY_DISPATCH_CONCURRENCY", &v, "must be at least 1"));
            }
            config.dispatch_concurrency = n;
        }

        if let Some(v) = get("JOBRELAY_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = parse_secs("JOBRELAY_SWEEP_INTERVAL_SECS", &v)?;
        }

        config.redis_url = get("JOBRELAY_REDIS_URL");
        if let Some(prefix) = get("JOBRELAY_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        config.database_url = get("DATABASE_URL");

        if config.release_ttl > config.correlation_ttl {
            warn!(
                release_ttl_secs = config.release_ttl.as_secs(),
                correlation_ttl_secs = config.correlation_ttl.as_secs(),
                "release TTL exceeds correlation TTL; released entries keep their original expiry"
            );
        }

        Ok(config)
    }

    pub fn with_correlation_ttl(mut self, ttl: Duration) -> Self {
        self.correlation_ttl = ttl;
        self
    }

    pub fn with_release_ttl(mut self, ttl: Duration) -> Self {
        self.release_ttl = ttl;
        self
    }

    pub fn with_release_mode(mut self, mode: ReleaseMode) -> Self {
        self.release_mode = mode;
        self
    }

    pub fn with_dispatch_concurrency(mut self, concurrency: usize) -> Self {
        self.dispatch_concurrency = concurrency.max(1);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_submission_retry(mut self, retry: RetryPolicy) -> Self {
        self.submission_retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.correlation_ttl, Duration::from_secs(86_400));
        assert_eq!(config.release_ttl, Duration::from_secs(60));
        assert_eq!(config.release_mode, ReleaseMode::AtomicClaim);
        assert_eq!(config.key_prefix, "jobrelay:correlation");
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("JOBRELAY_CORRELATION_TTL_SECS", "3600"),
            ("JOBRELAY_RELEASE_TTL_SECS", "5"),
            ("JOBRELAY_RELEASE_MODE", "get_then_release"),
            ("JOBRELAY_DISPATCH_CONCURRENCY", "8"),
            ("JOBRELAY_SWEEP_INTERVAL_SECS", "15"),
            ("JOBRELAY_REDIS_URL", "redis://cache:6379"),
            ("JOBRELAY_KEY_PREFIX", "media:jobs"),
            ("DATABASE_URL", "postgres://db/app"),
        ]))
        .unwrap();

        assert_eq!(config.correlation_ttl, Duration::from_secs(3600));
        assert_eq!(config.release_ttl, Duration::from_secs(5));
        assert_eq!(config.release_mode, ReleaseMode::GetThenRelease);
        assert_eq!(config.dispatch_concurrency, 8);
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.key_prefix, "media:jobs");
        assert_eq!(config.database_url.as_deref(), Some("postgres://db/app"));
    }

    #[test]
    fn invalid_values_name_the_offending_key() {
        let err = EngineConfig::from_lookup(lookup(&[("JOBRELAY_RELEASE_TTL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JOBRELAY_RELEASE_TTL_SECS", .. }));

        let err = EngineConfig::from_lookup(lookup(&[("JOBRELAY_DISPATCH_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JOBRELAY_DISPATCH_CONCURRENCY", .. }));

        assert!(EngineConfig::from_lookup(lookup(&[("JOBRELAY_RELEASE_MODE", "eventually")])).is_err());
    }
}
