use std::sync::Arc;

use jobrelay_core::{BoundingBox, Confidence, DecodedResult, JobContext, JobId, JobKind, Label};

use crate::handler::{DecodeError, ResultHandler};
use crate::normalize::{Selection, percent_confidence};
use crate::provider::LabelPage;
use crate::source::{PayloadArchive, ResultSource};

use super::{fetch, group_by_timestamp};

/// Decodes label-detection jobs into labels, one result per media timestamp.
pub struct LabelDetectionHandler {
    source: Arc<dyn ResultSource>,
    archive: Arc<dyn PayloadArchive>,
    default_min_confidence: Confidence,
}

impl LabelDetectionHandler {
    pub fn new(source: Arc<dyn ResultSource>, archive: Arc<dyn PayloadArchive>) -> Self {
        Self {
            source,
            archive,
            default_min_confidence: Confidence::ZERO,
        }
    }

    /// Threshold used when the job context does not carry one.
    pub fn with_default_min_confidence(mut self, min_confidence: Confidence) -> Self {
        self.default_min_confidence = min_confidence;
        self
    }
}

impl ResultHandler for LabelDetectionHandler {
    fn kind(&self) -> JobKind {
        JobKind::label_detection()
    }

    fn decode(&self, job_id: &JobId, context: &JobContext) -> Result<Vec<DecodedResult>, DecodeError> {
        let kind = self.kind();
        let fetched = fetch::<LabelPage>(self.source.as_ref(), self.archive.as_ref(), job_id, &kind)?;

        let mut labels = Vec::new();
        for page in fetched.pages {
            for item in page.labels {
                let confidence = percent_confidence(item.label.confidence)?;
                let mut label = Label::new(item.label.name, confidence).at(item.timestamp);
                if let Some(b) = item.label.instances.iter().find_map(|i| i.bounding_box) {
                    label = label.with_geometry(BoundingBox::from(b));
                }
                labels.push(label);
            }
        }

        let selection = Selection::from_options(&context.options, self.default_min_confidence);
        let labels = selection.apply(labels, |l| l.confidence);

        Ok(group_by_timestamp(labels, |l| l.timestamp_ms)
            .into_iter()
            .map(|group| {
                DecodedResult::new(
                    kind.clone(),
                    context.target.clone(),
                    context.field.clone(),
                    fetched.raw_payload.clone(),
                )
                .with_labels(group)
            })
            .collect())
    }
}
