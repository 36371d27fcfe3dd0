//! Collaborator seams: where raw results come from and where they are archived.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use jobrelay_core::{JobId, JobKind, PayloadRef};

use crate::handler::DecodeError;

/// One page of a provider result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub body: JsonValue,
    /// Token for the next page; `None` (or empty) on the last page.
    pub next_token: Option<String>,
}

impl RawPage {
    pub fn new(body: JsonValue, next_token: Option<String>) -> Self {
        Self { body, next_token }
    }

    pub fn last(body: JsonValue) -> Self {
        Self::new(body, None)
    }
}

/// Provider result client.
///
/// Errors are opaque provider/client failures.
pub trait ResultSource: Send + Sync {
    fn fetch_page(&self, job_id: &JobId, next_token: Option<&str>) -> anyhow::Result<RawPage>;
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    #[error("archive serialization error: {0}")]
    Serialization(String),
}

/// Side store for the full raw provider payload of a job.
pub trait PayloadArchive: Send + Sync {
    fn archive(
        &self,
        job_id: &JobId,
        kind: &JobKind,
        payload: &JsonValue,
    ) -> Result<PayloadRef, ArchiveError>;
}

/// Fetch every page of a job's result, following `next_token` until exhausted.
pub fn collect_pages<S>(source: &S, job_id: &JobId) -> Result<Vec<RawPage>, DecodeError>
where
    S: ResultSource + ?Sized,
{
    let mut pages = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = source.fetch_page(job_id, token.as_deref())?;
        token = page.next_token.clone().filter(|t| !t.is_empty());
        pages.push(page);

        if token.is_none() {
            break;
        }
    }

    debug!(job_id = %job_id, pages = pages.len(), "fetched provider result");
    Ok(pages)
}
