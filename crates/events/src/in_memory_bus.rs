//! In-memory notification bus for tests/dev.

use std::sync::{Mutex, mpsc};

use crate::bus::{NotificationBus, Subscription};
use crate::notification::CompletionNotification;

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("in-memory bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - No IO
/// - Best-effort fan-out to every live subscription
/// - Duplicates are the publisher's choice (tests publish twice to simulate redelivery)
#[derive(Debug, Default)]
pub struct InMemoryNotificationBus {
    subscribers: Mutex<Vec<mpsc::Sender<CompletionNotification>>>,
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationBus for InMemoryNotificationBus {
    type Error = InMemoryBusError;

    fn publish(&self, notification: CompletionNotification) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // Drop dead subscribers while publishing.
        subs.retain(|tx| tx.send(notification.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<CompletionNotification> {
        let (tx, rx) = mpsc::channel();

        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}
