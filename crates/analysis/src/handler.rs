use thiserror::Error;

use jobrelay_core::{DecodedResult, DomainError, JobContext, JobId, JobKind};

use crate::source::ArchiveError;

/// Decoder for one job kind.
///
/// Implementations fetch the provider's raw result for `job_id`, normalize it
/// using the options captured in `context`, and return zero or more results.
/// Decoding must not mutate downstream state.
pub trait ResultHandler: Send + Sync {
    /// The job kind this handler decodes.
    fn kind(&self) -> JobKind;

    fn decode(&self, job_id: &JobId, context: &JobContext) -> Result<Vec<DecodedResult>, DecodeError>;
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to fetch provider result: {0}")]
    Source(#[from] anyhow::Error),

    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("unreadable job context: {0}")]
    Context(#[from] DomainError),

    #[error("no handler registered for job kind {0}")]
    UnknownKind(JobKind),

    #[error("failed to archive raw payload: {0}")]
    Archive(#[from] ArchiveError),
}

impl DecodeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
