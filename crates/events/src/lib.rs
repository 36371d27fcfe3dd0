//! Completion notifications and the transport abstraction that delivers them.

pub mod bus;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{NotificationBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryNotificationBus};
pub use notification::{CompletionNotification, NotificationParseError, Outcome};
