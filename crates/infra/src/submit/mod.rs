//! Submission path: start an external job, then record its context.
//!
//! ## Ordering
//!
//! 1. Build and encode the job context (nothing external has happened yet).
//! 2. Call the provider's start operation, retrying per [`SubmissionPolicy`].
//! 3. Only after the provider returned a job id, write the correlation entry.
//!
//! A failed submission therefore never leaves an entry with no job behind it.

mod policy;
mod submitter;

pub use policy::{BackoffStrategy, RetryPolicy, SubmissionPolicy};
pub use submitter::{DEFAULT_CORRELATION_TTL, JobSubmitter, SubmittedJob, WorkUnit};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobrelay_core::{DecodeOptions, DomainError, JobId, JobKind};

use crate::correlation::StoreError;

/// Failure reported by the provider's start operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Throttling, timeouts, 5xx: worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Semantically invalid request: retrying cannot help.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Request handed to the provider's asynchronous start operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub kind: JobKind,
    /// Location of the blob to analyse.
    pub input: String,
    pub options: DecodeOptions,
    /// Stable across retries of the same unit so the provider can de-duplicate.
    pub client_token: String,
}

/// External asynchronous job service.
pub trait ExternalJobService: Send + Sync {
    fn start_job(&self, request: &StartJobRequest) -> Result<JobId, ProviderError>;
}

impl<S> ExternalJobService for std::sync::Arc<S>
where
    S: ExternalJobService + ?Sized,
{
    fn start_job(&self, request: &StartJobRequest) -> Result<JobId, ProviderError> {
        (**self).start_job(request)
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("provider start call failed after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("job {job_id} started but its context could not be stored: {source}")]
    Store {
        job_id: JobId,
        #[source]
        source: StoreError,
    },

    #[error("job context could not be encoded: {0}")]
    Context(#[from] DomainError),

    #[error("engine is shutting down; submission refused")]
    ShuttingDown,
}
