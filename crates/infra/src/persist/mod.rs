//! Applying decoded results to the downstream document store.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, instrument, warn};

use jobrelay_core::{DecodedResult, TargetRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("target not found: {0}")]
    TargetMissing(TargetRef),

    #[error("result rejected: {0}")]
    Validation(String),

    #[error("downstream store unavailable: {0}")]
    Unavailable(String),
}

/// Applies one decoded result. Each call is independent of its siblings.
pub trait ResultPersister: Send + Sync {
    fn persist(&self, result: &DecodedResult) -> Result<(), PersistError>;
}

impl<P> ResultPersister for Arc<P>
where
    P: ResultPersister + ?Sized,
{
    fn persist(&self, result: &DecodedResult) -> Result<(), PersistError> {
        (**self).persist(result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownstreamError {
    #[error("not found: {0}")]
    NotFound(TargetRef),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Document persistence layer. Each `save` runs in its own transaction.
pub trait DownstreamStore: Send + Sync {
    fn save(&self, target: &TargetRef, result: &DecodedResult) -> Result<(), DownstreamError>;
}

impl<D> DownstreamStore for Arc<D>
where
    D: DownstreamStore + ?Sized,
{
    fn save(&self, target: &TargetRef, result: &DecodedResult) -> Result<(), DownstreamError> {
        (**self).save(target, result)
    }
}

/// [`ResultPersister`] that writes through a [`DownstreamStore`].
#[derive(Debug, Clone)]
pub struct DownstreamPersister<D> {
    store: D,
}

impl<D: DownstreamStore> DownstreamPersister<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &D {
        &self.store
    }
}

impl<D: DownstreamStore> ResultPersister for DownstreamPersister<D> {
    #[instrument(skip(self, result), fields(document = %result.target, field = %result.field, kind = %result.kind))]
    fn persist(&self, result: &DecodedResult) -> Result<(), PersistError> {
        match self.store.save(&result.target, result) {
            Ok(()) => Ok(()),
            Err(DownstreamError::NotFound(target)) => {
                warn!("target no longer exists; result skipped");
                Err(PersistError::TargetMissing(target))
            }
            Err(DownstreamError::Validation(reason)) => {
                warn!(reason = %reason, "downstream rejected result");
                Err(PersistError::Validation(reason))
            }
            Err(DownstreamError::Unavailable(reason)) => {
                error!(reason = %reason, "downstream store unavailable");
                Err(PersistError::Unavailable(reason))
            }
        }
    }
}

/// Checks shared by every downstream store before writing.
pub(crate) fn validate(result: &DecodedResult) -> Result<(), DownstreamError> {
    if result.field.trim().is_empty() {
        return Err(DownstreamError::Validation("field must not be empty".into()));
    }

    let names = result
        .tags
        .iter()
        .map(|t| t.name.as_str())
        .chain(result.labels.iter().map(|l| l.name.as_str()));
    for name in names {
        if name.trim().is_empty() {
            return Err(DownstreamError::Validation("tag/label name must not be empty".into()));
        }
    }

    Ok(())
}
