//! Notification publishing/subscription abstraction (mechanics only).
//!
//! Completion notifications come from the provider's signalling channel (pub/sub
//! topic, webhook relay, queue). The bus is the seam between that transport and
//! the dispatcher.
//!
//! ## Delivery Guarantees
//!
//! The engine assumes **at-least-once** delivery:
//! - the same notification may arrive more than once;
//! - notifications for different jobs arrive in arbitrary order.
//!
//! Consumers must be idempotent. The dispatcher achieves this through the
//! correlation store: once a job's entry has been released, a duplicate
//! resolves to nothing and is logged as an orphan.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::notification::CompletionNotification;

/// A subscription to a notification stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). A subscription is meant to be drained by one
/// consumer; share it behind a mutex to fan work out to several threads.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(notification) => dispatcher.dispatch(&notification),
///         Err(RecvTimeoutError::Timeout) => continue,      // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,    // bus closed
///     };
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport-agnostic completion signal channel.
pub trait NotificationBus: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, notification: CompletionNotification) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<CompletionNotification>;
}

impl<B> NotificationBus for Arc<B>
where
    B: NotificationBus + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, notification: CompletionNotification) -> Result<(), Self::Error> {
        (**self).publish(notification)
    }

    fn subscribe(&self) -> Subscription<CompletionNotification> {
        (**self).subscribe()
    }
}
