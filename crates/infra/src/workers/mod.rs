//! Background workers: notification dispatch and correlation expiry.

mod expiry_sweeper;
mod notification_worker;

pub use expiry_sweeper::ExpirySweeper;
pub use notification_worker::{NotificationWorker, WorkerHandle};
