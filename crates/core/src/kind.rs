use serde::{Deserialize, Serialize};

/// Job kind, used to route a completed job to its decoder.
///
/// Kinds are plain identifiers (`label_detection`, `text_detection`, ...)
/// so that context records stay readable and portable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKind(String);

impl JobKind {
    pub const LABEL_DETECTION: &'static str = "label_detection";
    pub const TEXT_DETECTION: &'static str = "text_detection";
    pub const FACE_DETECTION: &'static str = "face_detection";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn label_detection() -> Self {
        Self::new(Self::LABEL_DETECTION)
    }

    pub fn text_detection() -> Self {
        Self::new(Self::TEXT_DETECTION)
    }

    pub fn face_detection() -> Self {
        Self::new(Self::FACE_DETECTION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
