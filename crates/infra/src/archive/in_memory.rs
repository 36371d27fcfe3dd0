use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use jobrelay_analysis::{ArchiveError, PayloadArchive};
use jobrelay_core::{JobId, JobKind, PayloadRef};

/// In-memory payload archive for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPayloadArchive {
    payloads: RwLock<HashMap<PayloadRef, JsonValue>>,
}

impl InMemoryPayloadArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, reference: &PayloadRef) -> Option<JsonValue> {
        self.payloads.read().ok()?.get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.payloads.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PayloadArchive for InMemoryPayloadArchive {
    fn archive(
        &self,
        _job_id: &JobId,
        _kind: &JobKind,
        payload: &JsonValue,
    ) -> Result<PayloadRef, ArchiveError> {
        let reference = PayloadRef::generate();
        self.payloads
            .write()
            .map_err(|_| ArchiveError::Unavailable("archive lock poisoned".into()))?
            .insert(reference.clone(), payload.clone());
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_archive_call_gets_its_own_reference() {
        let archive = InMemoryPayloadArchive::new();
        let job = JobId::new("j1").unwrap();
        let kind = JobKind::label_detection();

        let first = archive.archive(&job, &kind, &json!([{"Labels": []}])).unwrap();
        let second = archive.archive(&job, &kind, &json!([])).unwrap();

        assert_ne!(first, second);
        assert_eq!(archive.load(&first), Some(json!([{"Labels": []}])));
        assert_eq!(archive.len(), 2);
    }
}
