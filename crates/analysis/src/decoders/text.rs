use std::sync::Arc;

use jobrelay_core::{Confidence, DecodedResult, JobContext, JobId, JobKind, Tag};

use crate::handler::{DecodeError, ResultHandler};
use crate::normalize::{Selection, percent_confidence};
use crate::provider::TextPage;
use crate::source::{PayloadArchive, ResultSource};

use super::fetch;

/// Decodes text-detection jobs into located text tags, one result per job.
///
/// Word-level detections are skipped when the provider also reports lines, since
/// every word is already covered by its line.
pub struct TextDetectionHandler {
    source: Arc<dyn ResultSource>,
    archive: Arc<dyn PayloadArchive>,
    default_min_confidence: Confidence,
}

impl TextDetectionHandler {
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

impl ResultHandler for TextDetectionHandler {
    fn kind(&self) -> JobKind {
        JobKind::text_detection()
    }

    fn decode(&self, job_id: &JobId, context: &JobContext) -> Result<Vec<DecodedResult>, DecodeError> {
        let kind = self.kind();
        let fetched = fetch::<TextPage>(self.source.as_ref(), self.archive.as_ref(), job_id, &kind)?;

        let detections: Vec<_> = fetched
            .pages
            .into_iter()
            .flat_map(|page| page.text_detections)
            .collect();
        let has_lines = detections
            .iter()
            .any(|d| d.text_detection.kind.as_deref() == Some("LINE"));

        let mut tags = Vec::new();
        for item in detections {
            let text = item.text_detection;
            if has_lines && text.kind.as_deref() == Some("WORD") {
                continue;
            }

            let confidence = percent_confidence(text.confidence)?;
            let mut tag = Tag::new(text.detected_text, confidence).at(item.timestamp);
            if let Some(geometry) = text.geometry.to_provider_geometry() {
                tag = tag.with_geometry(geometry.normalize());
            }
            tags.push(tag);
        }

        let selection = Selection::from_options(&context.options, self.default_min_confidence);
        let tags = selection.apply(tags, |t| t.confidence);
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![
            DecodedResult::new(
                kind,
                context.target.clone(),
                context.field.clone(),
                fetched.raw_payload,
            )
            .with_tags(tags),
        ])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use jobrelay_core::{BoundingBox, DecodeOptions, TargetRef};

    use super::*;
    use crate::source::tests::{MemoryArchive, PagedSource};

    fn context() -> JobContext {
        JobContext::new(JobKind::text_detection(), TargetRef::new("d9").unwrap(), "file:content")
    }

    #[test]
    fn quadrilateral_polygon_becomes_box_and_odd_polygon_zero_box() {
        let source = Arc::new(PagedSource::chain(vec![json!({
            "TextDetections": [
                {"TextDetection": {"DetectedText": "STOP", "Type": "LINE", "Confidence": 99.0,
                    "Geometry": {"Polygon": [
                        {"X": 0.1, "Y": 0.1}, {"X": 0.3, "Y": 0.1},
                        {"X": 0.3, "Y": 0.2}, {"X": 0.1, "Y": 0.2}
                    ]}}},
                {"TextDetection": {"DetectedText": "EXIT", "Type": "LINE", "Confidence": 95.0,
                    "Geometry": {"Polygon": [{"X": 0.1, "Y": 0.1}, {"X": 0.3, "Y": 0.1}, {"X": 0.3, "Y": 0.2}]}}}
            ]
        })]));
        let handler = TextDetectionHandler::new(source, Arc::new(MemoryArchive::default()));

        let results = handler.decode(&JobId::new("t1").unwrap(), &context()).unwrap();
        assert_eq!(results.len(), 1);

        let tags = &results[0].tags;
        let stop = tags[0].geometry.unwrap();
        assert!((stop.width - 0.2).abs() < 1e-9);
        assert!((stop.height - 0.1).abs() < 1e-9);
        assert!((stop.left - 0.1).abs() < 1e-9);
        assert_eq!(tags[1].geometry, Some(BoundingBox::zero()));
    }

    #[test]
    fn words_are_skipped_when_lines_exist() {
        let source = Arc::new(PagedSource::chain(vec![json!({
            "TextDetections": [
                {"TextDetection": {"DetectedText": "HELLO WORLD", "Type": "LINE", "Confidence": 90.0}},
                {"TextDetection": {"DetectedText": "HELLO", "Type": "WORD", "Confidence": 90.0}},
                {"TextDetection": {"DetectedText": "WORLD", "Type": "WORD", "Confidence": 90.0}}
            ]
        })]));
        let handler = TextDetectionHandler::new(source, Arc::new(MemoryArchive::default()));

        let results = handler.decode(&JobId::new("t2").unwrap(), &context()).unwrap();
        assert_eq!(results[0].tags.len(), 1);
        assert_eq!(results[0].tags[0].name, "HELLO WORLD");
    }

    #[test]
    fn everything_filtered_yields_no_result() {
        let source = Arc::new(PagedSource::chain(vec![json!({
            "TextDetections": [
                {"TextDetection": {"DetectedText": "faint", "Confidence": 10.0}}
            ]
        })]));
        let handler = TextDetectionHandler::new(source, Arc::new(MemoryArchive::default()));
        let ctx = context().with_options(
            DecodeOptions::default().with_min_confidence(Confidence::new(0.5).unwrap()),
        );

        assert!(handler.decode(&JobId::new("t3").unwrap(), &ctx).unwrap().is_empty());
    }
}
