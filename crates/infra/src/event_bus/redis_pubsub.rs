//! Redis pub/sub completion channel (optional).
//!
//! Pub/sub is not durable: notifications published while no subscriber is
//! connected are lost, and the affected entries expire as orphans.
//!
//! Messages on the channel are either `CompletionNotification` JSON (as
//! published by [`RedisPubSubNotificationBus::publish`]) or the provider's
//! native `{"JobId", "Status", "API", "Message"}` shape relayed verbatim by
//! a bridge. Non-terminal provider statuses are skipped.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;
use tracing::{debug, warn};

use jobrelay_events::{
    CompletionNotification, NotificationBus, NotificationParseError, Subscription,
};

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone)]
pub struct RedisPubSubNotificationBus {
    client: redis::Client,
    channel: String,
}

impl RedisPubSubNotificationBus {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

/// Accept either wire shape found on the channel.
fn parse_message(payload: &str) -> Result<CompletionNotification, NotificationParseError> {
    match serde_json::from_str::<CompletionNotification>(payload) {
        Ok(n) => Ok(n),
        Err(_) => CompletionNotification::from_provider_message(payload),
    }
}

impl NotificationBus for RedisPubSubNotificationBus {
    type Error = RedisBusError;

    fn publish(&self, notification: CompletionNotification) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&notification)
            .map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        let _: i64 = conn
            .publish(&self.channel, payload)
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        Ok(())
    }

    fn subscribe(&self) -> Subscription<CompletionNotification> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Forward pub/sub messages until the subscription is dropped.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "redis subscription could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&channel) {
                warn!(channel = %channel, error = %e, "redis subscribe failed");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "redis subscription ended");
                        return;
                    }
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let notification = match parse_message(&payload) {
                    Ok(n) => n,
                    Err(NotificationParseError::NonTerminalStatus { job_id, status }) => {
                        debug!(job_id = %job_id, status = %status, "skipping non-terminal status");
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping unparseable notification");
                        continue;
                    }
                };

                if tx.send(notification).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrelay_events::Outcome;

    #[test]
    fn both_wire_shapes_are_accepted() {
        let native = r#"{"JobId":"j1","Status":"SUCCEEDED","API":"StartLabelDetection"}"#;
        let own = serde_json::to_string(&CompletionNotification::failure(
            jobrelay_core::JobId::new("j2").unwrap(),
            "StartTextDetection",
            None,
        ))
        .unwrap();

        assert_eq!(parse_message(native).unwrap().outcome, Outcome::Success);
        assert!(!parse_message(&own).unwrap().outcome.is_success());
        assert!(matches!(
            parse_message(r#"{"JobId":"j3","Status":"IN_PROGRESS","API":"x"}"#),
            Err(NotificationParseError::NonTerminalStatus { .. })
        ));
    }
}
