use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::correlation::CorrelationStore;

use super::WorkerHandle;

const TICK: Duration = Duration::from_millis(250);

/// Calls `purge_expired` on a correlation store every `interval`.
#[derive(Debug)]
pub struct ExpirySweeper;

impl ExpirySweeper {
    pub fn spawn<C>(name: &str, store: C, interval: Duration) -> io::Result<WorkerHandle>
    where
        C: CorrelationStore + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread_name = name.to_string();

        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || sweep_loop(&thread_name, &store, &stop_flag, interval))?;

        info!(worker = name, interval_secs = interval.as_secs(), "expiry sweeper started");
        Ok(WorkerHandle::new(stop, vec![join]))
    }
}

fn sweep_loop<C>(name: &str, store: &C, stop: &AtomicBool, interval: Duration)
where
    C: CorrelationStore,
{
    let mut last = Instant::now();
    while !stop.load(Ordering::Acquire) {
        thread::sleep(TICK.min(interval));
        if last.elapsed() < interval {
            continue;
        }
        last = Instant::now();

        match store.purge_expired() {
            Ok(0) => {}
            Ok(removed) => debug!(worker = name, removed, "expired correlation entries swept"),
            Err(e) => warn!(worker = name, error = %e, "expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{InMemoryCorrelationStore, ManualClock};
    use jobrelay_core::JobId;

    #[test]
    fn sweeper_evicts_expired_entries_in_the_background() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryCorrelationStore::new().with_clock(clock.clone()));
        for i in 0..10 {
            store
                .put(&JobId::new(format!("j{i}")).unwrap(), b"ctx", Duration::from_secs(5))
                .unwrap();
        }
        clock.advance(Duration::from_secs(5));

        let handle = ExpirySweeper::spawn("test-sweeper", store.clone(), Duration::from_millis(20)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.held() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(store.held(), 0);
    }
}
