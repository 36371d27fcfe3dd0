//! Filesystem payload archive.
//!
//! Payloads are written as `{root}/{kind}/{job_id}-{uuid}.json`; the returned
//! reference is the path relative to `root`. Files are written to a temporary
//! name first and renamed, so a reader never sees a partial payload.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use jobrelay_analysis::{ArchiveError, PayloadArchive};
use jobrelay_core::{JobId, JobKind, PayloadRef};

#[derive(Debug, Clone)]
pub struct FsPayloadArchive {
    root: PathBuf,
}

fn io_error(e: io::Error) -> ArchiveError {
    ArchiveError::Unavailable(e.to_string())
}

/// Keep path components to a conservative character set.
fn path_safe(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

impl FsPayloadArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read back an archived payload.
    pub fn load(&self, reference: &PayloadRef) -> Result<JsonValue, ArchiveError> {
        let bytes = fs::read(self.root.join(reference.as_str())).map_err(io_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ArchiveError::Serialization(e.to_string()))
    }
}

impl PayloadArchive for FsPayloadArchive {
    fn archive(
        &self,
        job_id: &JobId,
        kind: &JobKind,
        payload: &JsonValue,
    ) -> Result<PayloadRef, ArchiveError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| ArchiveError::Serialization(e.to_string()))?;

        let dir = path_safe(kind.as_str());
        let file = format!("{}-{}.json", path_safe(job_id.as_str()), Uuid::now_v7());
        let relative = format!("{dir}/{file}");

        let dir_path = self.root.join(&dir);
        fs::create_dir_all(&dir_path).map_err(io_error)?;

        let tmp = dir_path.join(format!(".{file}.tmp"));
        fs::write(&tmp, &bytes).map_err(io_error)?;
        fs::rename(&tmp, dir_path.join(&file)).map_err(io_error)?;

        debug!(job_id = %job_id, path = %relative, bytes = bytes.len(), "archived raw payload");

        PayloadRef::new(relative).map_err(|e| ArchiveError::Unavailable(e.to_string()))
    }
}
