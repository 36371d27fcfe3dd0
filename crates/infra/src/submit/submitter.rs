use std::thread;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use jobrelay_core::{DecodeOptions, JobContext, JobId, JobKind, TargetRef};

use super::{ExternalJobService, ProviderError, StartJobRequest, SubmissionError, SubmissionPolicy};
use crate::correlation::CorrelationStore;
use crate::lifecycle::Lifecycle;

/// Default lifetime of a correlation entry (24h).
pub const DEFAULT_CORRELATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One independent piece of work: analyse `input` and attach results to
/// `field` on `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub target: TargetRef,
    pub field: String,
    pub input: String,
    pub options: DecodeOptions,
}

impl WorkUnit {
    pub fn new(target: TargetRef, field: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            target,
            field: field.into(),
            input: input.into(),
            options: DecodeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }
}

/// A job the provider accepted and whose context is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    pub job_id: JobId,
    pub target: TargetRef,
    pub field: String,
    /// Provider calls made, including the successful one.
    pub attempts: u32,
}

/// Starts jobs of one kind and records their context.
///
/// Generic over the provider and the store so tests can plug in fakes and
/// callers can share either behind an `Arc`.
#[derive(Debug)]
pub struct JobSubmitter<S, C> {
    kind: JobKind,
    service: S,
    store: C,
    policy: SubmissionPolicy,
    ttl: Duration,
    lifecycle: Lifecycle,
}

impl<S, C> JobSubmitter<S, C>
where
    S: ExternalJobService,
    C: CorrelationStore,
{
    pub fn new(kind: JobKind, service: S, store: C) -> Self {
        Self {
            kind,
            service,
            store,
            policy: SubmissionPolicy::default(),
            ttl: DEFAULT_CORRELATION_TTL,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_policy(mut self, policy: SubmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    /// Start one job and store its context under the returned job id.
    #[instrument(skip(self, unit), fields(kind = %self.kind, document = %unit.target, field = %unit.field))]
    pub fn submit(&self, unit: WorkUnit) -> Result<SubmittedJob, SubmissionError> {
        if !self.lifecycle.is_accepting() {
            return Err(SubmissionError::ShuttingDown);
        }

        let context = JobContext::new(self.kind.clone(), unit.target.clone(), unit.field.clone())
            .with_options(unit.options.clone());
        let encoded = context.encode()?;

        let request = StartJobRequest {
            kind: self.kind.clone(),
            input: unit.input,
            options: unit.options,
            client_token: Uuid::now_v7().to_string(),
        };

        let (job_id, attempts) = self.start_with_retry(&request)?;

        if let Err(source) = self.store.put(&job_id, &encoded, self.ttl) {
            // The job runs anyway; its notification will be treated as an orphan.
            error!(job_id = %job_id, error = %source, "failed to store job context");
            return Err(SubmissionError::Store { job_id, source });
        }

        info!(job_id = %job_id, attempts, "job submitted");

        Ok(SubmittedJob {
            job_id,
            target: unit.target,
            field: unit.field,
            attempts,
        })
    }

    /// Submit independent units; one failure does not affect the others.
    pub fn submit_all(
        &self,
        units: impl IntoIterator<Item = WorkUnit>,
    ) -> Vec<Result<SubmittedJob, SubmissionError>> {
        units.into_iter().map(|unit| self.submit(unit)).collect()
    }

    fn start_with_retry(&self, request: &StartJobRequest) -> Result<(JobId, u32), SubmissionError> {
        let retry = &self.policy.retry;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let err = match self.service.start_job(request) {
                Ok(job_id) => return Ok((job_id, attempts)),
                Err(err) => err,
            };

            if !self.should_retry(&err, attempts) {
                warn!(attempts, error = %err, "giving up on job start");
                return Err(SubmissionError::Provider {
                    attempts,
                    source: err,
                });
            }

            let delay = retry.delay_for_attempt(attempts);
            warn!(
                attempts,
                max_attempts = retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "job start failed, retrying"
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            if !self.lifecycle.is_accepting() {
                return Err(SubmissionError::ShuttingDown);
            }
        }
    }

    fn should_retry(&self, err: &ProviderError, attempts: u32) -> bool {
        self.policy.is_retryable(err) && self.policy.retry.should_retry(attempts)
    }
}
