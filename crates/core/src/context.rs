//! Versioned job context record.
//!
//! A `JobContext` is written to the correlation store when a job is started and
//! read back when its completion notification arrives, possibly in another
//! process. It carries exactly what the decoder needs to interpret and apply
//! the job's results.
//!
//! The wire format is JSON with an explicit `version` field. Readers accept any
//! version up to [`CONTEXT_VERSION`]; unknown fields are ignored so older
//! readers tolerate additive changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::TargetRef;
use crate::kind::JobKind;
use crate::value_object::Confidence;

/// Current context schema version.
pub const CONTEXT_VERSION: u32 = 1;

/// Decode-time options captured at submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Items strictly below this confidence are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<Confidence>,

    /// Keep at most this many items (after filtering), in provider order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl DecodeOptions {
    pub fn with_min_confidence(mut self, min_confidence: Confidence) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Business context correlated with an in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub version: u32,
    pub kind: JobKind,
    pub target: TargetRef,
    /// Property/field on the target the results belong to.
    pub field: String,
    #[serde(default)]
    pub options: DecodeOptions,
    pub submitted_at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(kind: JobKind, target: TargetRef, field: impl Into<String>) -> Self {
        Self {
            version: CONTEXT_VERSION,
            kind,
            target,
            field: field.into(),
            options: DecodeOptions::default(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Serialize to the portable byte form stored in the correlation store.
    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DomainError::encoding(e.to_string()))
    }

    /// Parse a stored context, rejecting records from a newer schema.
    pub fn decode(bytes: &[u8]) -> DomainResult<Self> {
        let ctx: JobContext =
            serde_json::from_slice(bytes).map_err(|e| DomainError::encoding(e.to_string()))?;

        if ctx.version == 0 || ctx.version > CONTEXT_VERSION {
            return Err(DomainError::UnsupportedContextVersion {
                found: ctx.version,
                supported: CONTEXT_VERSION,
            });
        }

        Ok(ctx)
    }
}
