use std::collections::HashMap;
use std::sync::RwLock;

use jobrelay_core::{DecodedResult, TargetRef};

use super::{DownstreamError, DownstreamStore, validate};

/// In-memory document store for tests/dev.
///
/// Only targets registered up front exist; saving against any other target
/// reports `NotFound`, like a document deleted while its job was running.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<TargetRef, Vec<DecodedResult>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let store = Self::new();
        for target in targets {
            if let Ok(target) = TargetRef::new(target.as_ref()) {
                store.add_target(target);
            }
        }
        store
    }

    pub fn add_target(&self, target: TargetRef) {
        if let Ok(mut docs) = self.documents.write() {
            docs.entry(target).or_default();
        }
    }

    pub fn remove_target(&self, target: &TargetRef) {
        if let Ok(mut docs) = self.documents.write() {
            docs.remove(target);
        }
    }

    /// Results saved against `target`, in save order.
    pub fn results_for(&self, target: &TargetRef) -> Vec<DecodedResult> {
        self.documents
            .read()
            .ok()
            .and_then(|docs| docs.get(target).cloned())
            .unwrap_or_default()
    }

    /// Total number of saved results across all targets.
    pub fn saved_count(&self) -> usize {
        self.documents
            .read()
            .map(|docs| docs.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl DownstreamStore for InMemoryDocumentStore {
    fn save(&self, target: &TargetRef, result: &DecodedResult) -> Result<(), DownstreamError> {
        validate(result)?;

        let mut docs = self
            .documents
            .write()
            .map_err(|_| DownstreamError::Unavailable("document store lock poisoned".into()))?;

        let doc = docs
            .get_mut(target)
            .ok_or_else(|| DownstreamError::NotFound(target.clone()))?;
        doc.push(result.clone());
        Ok(())
    }
}
