//! Completion notification → context → decoder → persister.
//!
//! ## Flow
//!
//! ```text
//! notification ─┬─ Failure ──► release entry ──► FailureAcknowledged
//!               └─ Success ──► resolve context ─┬─ none ──► Orphan
//!                                               └─ bytes ─► JobContext::decode
//!                                                           └─► registry.decode
//!                                                               └─► persist each result
//! ```
//!
//! Everything after a notification is received ends here: errors are logged
//! and counted, never propagated, and the dispatcher never panics on bad
//! input. The one exception is `Rejected`, returned without touching any
//! state once the engine stops, so the transport can redeliver elsewhere.

mod stats;

pub use stats::DispatchStats;

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use jobrelay_analysis::HandlerRegistry;
use jobrelay_core::{JobContext, JobId, JobKind};
use jobrelay_events::{CompletionNotification, Outcome};

use crate::correlation::{CorrelationStore, StoreError};
use crate::lifecycle::Lifecycle;
use crate::persist::ResultPersister;

use stats::Counters;

/// How a success notification resolves and releases its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// `claim`: lookup and release in one atomic step. Concurrent duplicates
    /// decode at most once.
    #[default]
    AtomicClaim,
    /// `get` then `release` as two calls. Concurrent duplicates may both
    /// decode before either release lands.
    GetThenRelease,
}

impl FromStr for ReleaseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" | "atomic_claim" | "claim" => Ok(ReleaseMode::AtomicClaim),
            "get_then_release" | "get-then-release" => Ok(ReleaseMode::GetThenRelease),
            other => Err(format!("unknown release mode `{other}`")),
        }
    }
}

/// Terminal state of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Context found and decoded; `persisted + failed` results were applied.
    Resolved {
        kind: JobKind,
        persisted: usize,
        failed: usize,
    },
    /// No pending context: unknown job, expired, or already handled.
    Orphan,
    /// Provider reported failure; the entry (if any) was released.
    FailureAcknowledged,
    /// Context was found and released but could not be decoded.
    DecodeFailed,
    /// The correlation store could not be reached.
    StoreUnavailable,
    /// The engine stopped; nothing was touched.
    Rejected,
}

pub struct NotificationDispatcher<C, P> {
    store: C,
    registry: Arc<HandlerRegistry>,
    persister: P,
    mode: ReleaseMode,
    lifecycle: Lifecycle,
    counters: Counters,
}

impl<C, P> std::fmt::Debug for NotificationDispatcher<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("mode", &self.mode)
            .field("kinds", &self.registry.kinds())
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl<C, P> NotificationDispatcher<C, P>
where
    C: CorrelationStore,
    P: ResultPersister,
{
    pub fn new(store: C, registry: Arc<HandlerRegistry>, persister: P) -> Self {
        Self {
            store,
            registry,
            persister,
            mode: ReleaseMode::default(),
            lifecycle: Lifecycle::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_release_mode(mut self, mode: ReleaseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn release_mode(&self) -> ReleaseMode {
        self.mode
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Handle one notification to a terminal state.
    #[instrument(
        skip(self, notification),
        fields(job_id = %notification.job_id, source = %notification.source_name)
    )]
    pub fn dispatch(&self, notification: &CompletionNotification) -> DispatchOutcome {
        if !self.lifecycle.is_accepting() {
            debug!("engine stopped; notification rejected");
            self.counters.rejected();
            return DispatchOutcome::Rejected;
        }

        self.counters.received();

        match &notification.outcome {
            Outcome::Failure { message } => {
                self.acknowledge_failure(&notification.job_id, message.as_deref())
            }
            Outcome::Success => self.resolve(&notification.job_id),
        }
    }

    fn acknowledge_failure(&self, job_id: &JobId, message: Option<&str>) -> DispatchOutcome {
        warn!(reason = message.unwrap_or(""), "provider reported job failure");

        match self.store.release(job_id) {
            Ok(()) => {
                self.counters.failure_acknowledged();
                DispatchOutcome::FailureAcknowledged
            }
            Err(e) => self.store_unavailable(e),
        }
    }

    fn resolve(&self, job_id: &JobId) -> DispatchOutcome {
        let bytes = match self.take_context(job_id) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("no pending context for job; treating notification as orphan");
                self.counters.orphan();
                return DispatchOutcome::Orphan;
            }
            Err(e) => return self.store_unavailable(e),
        };

        let context = match JobContext::decode(&bytes) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "stored job context is unreadable");
                self.counters.decode_error();
                return DispatchOutcome::DecodeFailed;
            }
        };

        let results = match self.registry.decode(job_id, &context) {
            Ok(results) => results,
            Err(e) => {
                error!(kind = %context.kind, error = %e, "failed to decode job result");
                self.counters.decode_error();
                return DispatchOutcome::DecodeFailed;
            }
        };

        let mut persisted = 0;
        let mut failed = 0;
        for result in &results {
            match self.persister.persist(result) {
                Ok(()) => {
                    persisted += 1;
                    self.counters.persisted();
                }
                Err(e) => {
                    failed += 1;
                    self.counters.persist_failure();
                    debug!(document = %result.target, error = %e, "result not persisted");
                }
            }
        }

        self.counters.resolved();
        info!(kind = %context.kind, persisted, failed, "job resolved");

        DispatchOutcome::Resolved {
            kind: context.kind,
            persisted,
            failed,
        }
    }

    /// Look up the pending context and release it according to the mode.
    fn take_context(&self, job_id: &JobId) -> Result<Option<Vec<u8>>, StoreError> {
        match self.mode {
            ReleaseMode::AtomicClaim => self.store.claim(job_id),
            ReleaseMode::GetThenRelease => {
                let bytes = self.store.get(job_id)?;
                if bytes.is_some() {
                    // The context is already in hand; a failed release only
                    // means a duplicate may decode again before the TTL.
                    if let Err(e) = self.store.release(job_id) {
                        warn!(error = %e, "failed to release correlation entry");
                    }
                }
                Ok(bytes)
            }
        }
    }

    fn store_unavailable(&self, e: StoreError) -> DispatchOutcome {
        error!(error = %e, "correlation store unavailable during dispatch");
        self.counters.store_error();
        DispatchOutcome::StoreUnavailable
    }
}
