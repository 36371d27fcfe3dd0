use std::sync::Arc;

use jobrelay_core::{Confidence, DecodedResult, JobContext, JobId, JobKind, Tag};

use crate::handler::{DecodeError, ResultHandler};
use crate::normalize::{Selection, percent_confidence};
use crate::provider::FacePage;
use crate::source::{PayloadArchive, ResultSource};

use super::{fetch, group_by_timestamp};

/// Tag name for faces the provider did not recognise.
const UNKNOWN_FACE: &str = "face";

/// Decodes face detection/recognition jobs into located tags, one result per timestamp.
pub struct FaceDetectionHandler {
    source: Arc<dyn ResultSource>,
    archive: Arc<dyn PayloadArchive>,
    default_min_confidence: Confidence,
}

impl FaceDetectionHandler {
    pub fn new(source: Arc<dyn ResultSource>, archive: Arc<dyn PayloadArchive>) -> Self {
        Self {
            source,
            archive,
            default_min_confidence: Confidence::ZERO,
        }
    }

    pub fn with_default_min_confidence(mut self, min_confidence: Confidence) -> Self {
        self.default_min_confidence = min_confidence;
        self
    }
}

impl ResultHandler for FaceDetectionHandler {
    fn kind(&self) -> JobKind {
        JobKind::face_detection()
    }

    fn decode(&self, job_id: &JobId, context: &JobContext) -> Result<Vec<DecodedResult>, DecodeError> {
        let kind = self.kind();
        let fetched = fetch::<FacePage>(self.source.as_ref(), self.archive.as_ref(), job_id, &kind)?;

        let mut tags = Vec::new();
        for page in fetched.pages {
            for item in page.faces {
                let face = item.face;
                let confidence = percent_confidence(face.confidence)?;
                let name = face
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_FACE.to_string());

                let mut tag = Tag::new(name, confidence).at(item.timestamp);
                if let Some(geometry) = face.geometry.to_provider_geometry() {
                    tag = tag.with_geometry(geometry.normalize());
                }
                tags.push(tag);
            }
        }

        let selection = Selection::from_options(&context.options, self.default_min_confidence);
        let tags = selection.apply(tags, |t| t.confidence);

        Ok(group_by_timestamp(tags, |t| t.timestamp_ms)
            .into_iter()
            .map(|group| {
                DecodedResult::new(
                    kind.clone(),
                    context.target.clone(),
                    context.field.clone(),
                    fetched.raw_payload.clone(),
                )
                .with_tags(group)
            })
            .collect())
    }
}
