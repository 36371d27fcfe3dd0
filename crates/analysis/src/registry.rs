//! Job kind → decoder dispatch table.

use std::collections::HashMap;

use thiserror::Error;

use jobrelay_core::{DecodedResult, JobContext, JobId, JobKind};

use crate::handler::{DecodeError, ResultHandler};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a handler is already registered for job kind {0}")]
    DuplicateKind(JobKind),
}

/// Explicit registry of decoders, populated once at startup.
///
/// Registration happens before the registry is shared; afterwards it is only
/// read, so lookups need no locking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Box<dyn ResultHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under the kind it reports.
    pub fn register<H>(&mut self, handler: H) -> Result<(), RegistryError>
    where
        H: ResultHandler + 'static,
    {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::DuplicateKind(kind));
        }
        self.handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    /// Register a closure as the decoder for `kind`.
    pub fn register_fn<F>(&mut self, kind: impl Into<JobKind>, decode: F) -> Result<(), RegistryError>
    where
        F: Fn(&JobId, &JobContext) -> Result<Vec<DecodedResult>, DecodeError> + Send + Sync + 'static,
    {
        self.register(FnHandler {
            kind: kind.into(),
            decode,
        })
    }

    pub fn get(&self, kind: &JobKind) -> Option<&dyn ResultHandler> {
        self.handlers.get(kind).map(|h| h.as_ref())
    }

    /// Decode with the handler registered for the context's kind.
    pub fn decode(&self, job_id: &JobId, context: &JobContext) -> Result<Vec<DecodedResult>, DecodeError> {
        let handler = self
            .get(&context.kind)
            .ok_or_else(|| DecodeError::UnknownKind(context.kind.clone()))?;
        handler.decode(job_id, context)
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<JobKind> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

struct FnHandler<F> {
    kind: JobKind,
    decode: F,
}

impl<F> ResultHandler for FnHandler<F>
where
    F: Fn(&JobId, &JobContext) -> Result<Vec<DecodedResult>, DecodeError> + Send + Sync,
{
    fn kind(&self) -> JobKind {
        self.kind.clone()
    }

    fn decode(&self, job_id: &JobId, context: &JobContext) -> Result<Vec<DecodedResult>, DecodeError> {
        (self.decode)(job_id, context)
    }
}
