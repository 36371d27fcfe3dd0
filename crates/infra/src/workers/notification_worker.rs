use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use jobrelay_events::{CompletionNotification, NotificationBus, Subscription};

use crate::correlation::CorrelationStore;
use crate::dispatch::NotificationDispatcher;
use crate::persist::ResultPersister;

/// Poll interval for the shutdown flag while the bus is idle.
const TICK: Duration = Duration::from_millis(250);

/// Handle to stop and join a pool of worker threads.
#[derive(Debug)]
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    joins: Vec<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub(super) fn new(stop: Arc<AtomicBool>, joins: Vec<thread::JoinHandle<()>>) -> Self {
        Self { stop, joins }
    }

    pub fn threads(&self) -> usize {
        self.joins.len()
    }

    /// Request graceful shutdown and wait for every thread to finish its
    /// current notification.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        for join in self.joins {
            let _ = join.join();
        }
    }
}

/// Dispatches notifications from one bus subscription on `concurrency`
/// threads. Notifications for distinct jobs are handled in parallel; the
/// subscription lock is held only while waiting for the next message.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    pub fn spawn<B, C, P>(
        name: &str,
        bus: &B,
        dispatcher: Arc<NotificationDispatcher<C, P>>,
        concurrency: usize,
    ) -> io::Result<WorkerHandle>
    where
        B: NotificationBus + ?Sized,
        C: CorrelationStore + 'static,
        P: ResultPersister + 'static,
    {
        let subscription = Arc::new(Mutex::new(bus.subscribe()));
        let stop = Arc::new(AtomicBool::new(false));
        let concurrency = concurrency.max(1);

        let mut joins = Vec::with_capacity(concurrency);
        for index in 0..concurrency {
            let subscription = subscription.clone();
            let stop_flag = stop.clone();
            let dispatcher = dispatcher.clone();
            let thread_name = format!("{name}-{index}");

            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(&thread_name, &subscription, &stop_flag, &dispatcher));

            match spawned {
                Ok(join) => joins.push(join),
                Err(e) => {
                    // Stop whatever already started before reporting.
                    WorkerHandle { stop, joins }.shutdown();
                    return Err(e);
                }
            }
        }

        info!(worker = name, threads = concurrency, "notification workers started");
        Ok(WorkerHandle { stop, joins })
    }
}

fn next_notification(
    subscription: &Mutex<Subscription<CompletionNotification>>,
) -> Result<CompletionNotification, RecvTimeoutError> {
    let guard = match subscription.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.recv_timeout(TICK)
}

fn worker_loop<C, P>(
    name: &str,
    subscription: &Mutex<Subscription<CompletionNotification>>,
    stop: &AtomicBool,
    dispatcher: &NotificationDispatcher<C, P>,
) where
    C: CorrelationStore,
    P: ResultPersister,
{
    while !stop.load(Ordering::Acquire) {
        let notification = match next_notification(subscription) {
            Ok(n) => n,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!(worker = name, "notification bus closed");
                break;
            }
        };

        // A panicking decoder must not take the worker thread down with it.
        let result = catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(&notification)));
        match result {
            Ok(outcome) => debug!(worker = name, job_id = %notification.job_id, ?outcome, "notification handled"),
            Err(_) => error!(worker = name, job_id = %notification.job_id, "dispatch panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::correlation::InMemoryCorrelationStore;
    use crate::persist::{DownstreamPersister, InMemoryDocumentStore};
    use jobrelay_analysis::HandlerRegistry;
    use jobrelay_core::JobId;
    use jobrelay_events::InMemoryNotificationBus;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn pool_drains_the_bus_and_shuts_down() {
        let bus = InMemoryNotificationBus::new();
        let dispatcher = Arc::new(NotificationDispatcher::new(
            InMemoryCorrelationStore::arc(),
            Arc::new(HandlerRegistry::new()),
            DownstreamPersister::new(InMemoryDocumentStore::new()),
        ));

        let handle = NotificationWorker::spawn("test-worker", &bus, dispatcher.clone(), 3).unwrap();
        assert_eq!(handle.threads(), 3);

        for i in 0..20 {
            bus.publish(CompletionNotification::success(
                JobId::new(format!("unknown-{i}")).unwrap(),
                "StartLabelDetection",
            ))
            .unwrap();
        }

        assert!(wait_until(|| dispatcher.stats().orphans == 20));
        handle.shutdown();
    }
}
