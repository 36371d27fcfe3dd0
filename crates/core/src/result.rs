//! Normalized decoder output.
//!
//! This is *not* the provider's payload. Decoders translate whatever the
//! provider returned into these records; the raw payload is archived separately
//! and referenced through `raw_payload`.

use serde::{Deserialize, Serialize};

use crate::id::{PayloadRef, TargetRef};
use crate::kind::JobKind;
use crate::value_object::{BoundingBox, Confidence};

/// A localized finding (text region, face, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<BoundingBox>,
    /// Offset into the media, in milliseconds (video only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

/// A classification label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl Tag {
    pub fn new(name: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            name: name.into(),
            confidence,
            geometry: None,
            timestamp_ms: None,
        }
    }

    pub fn with_geometry(mut self, geometry: BoundingBox) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn at(mut self, timestamp_ms: Option<u64>) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

impl Label {
    pub fn new(name: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            name: name.into(),
            confidence,
            geometry: None,
            timestamp_ms: None,
        }
    }

    pub fn with_geometry(mut self, geometry: BoundingBox) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn at(mut self, timestamp_ms: Option<u64>) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// One unit of output to apply to the downstream store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedResult {
    pub kind: JobKind,
    pub target: TargetRef,
    pub field: String,
    pub tags: Vec<Tag>,
    pub labels: Vec<Label>,
    pub raw_payload: PayloadRef,
}

impl DecodedResult {
    pub fn new(
        kind: JobKind,
        target: TargetRef,
        field: impl Into<String>,
        raw_payload: PayloadRef,
    ) -> Self {
        Self {
            kind,
            target,
            field: field.into(),
            tags: Vec::new(),
            labels: Vec::new(),
            raw_payload,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = labels;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.labels.is_empty()
    }
}
