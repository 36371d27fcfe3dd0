//! Infrastructure-backed notification transports.
//!
//! The bus abstraction lives in `jobrelay-events` as pure mechanics. This
//! module provides implementations that talk to real brokers.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubNotificationBus};
