//! Provider payload shapes.
//!
//! These mirror the JSON the media-analysis provider returns for each result
//! page. Only the fields the decoders read are modelled; everything else in the
//! page is ignored here and kept verbatim in the archived payload.

use serde::Deserialize;

use jobrelay_core::{BoundingBox, Point};

use crate::normalize::ProviderGeometry;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawBox {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
}

impl From<RawBox> for BoundingBox {
    fn from(b: RawBox) -> Self {
        BoundingBox::new(b.width, b.height, b.left, b.top)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

impl From<RawPoint> for Point {
    fn from(p: RawPoint) -> Self {
        Point::new(p.x, p.y)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCorners {
    pub top_left: RawPoint,
    pub bottom_right: RawPoint,
}

/// Geometry block; providers fill in whichever representation they use.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawGeometry {
    #[serde(default)]
    pub bounding_box: Option<RawBox>,
    #[serde(default)]
    pub polygon: Option<Vec<RawPoint>>,
    #[serde(default)]
    pub corners: Option<RawCorners>,
}

impl RawGeometry {
    /// Pick the most precise representation present: polygon, then corners, then box.
    pub fn to_provider_geometry(&self) -> Option<ProviderGeometry> {
        if let Some(polygon) = &self.polygon {
            return Some(ProviderGeometry::Polygon(
                polygon.iter().copied().map(Point::from).collect(),
            ));
        }
        if let Some(c) = self.corners {
            return Some(ProviderGeometry::Corners(c.top_left.into(), c.bottom_right.into()));
        }
        self.bounding_box.map(|b| ProviderGeometry::Box(b.into()))
    }
}

// --- label detection -------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelPage {
    #[serde(default)]
    pub labels: Vec<TimedLabel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimedLabel {
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub label: RawLabel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawLabel {
    pub name: String,
    pub confidence: f64,
    #[serde(default)]
    pub instances: Vec<RawInstance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawInstance {
    #[serde(default)]
    pub bounding_box: Option<RawBox>,
}

// --- text detection --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextPage {
    #[serde(default)]
    pub text_detections: Vec<TimedText>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimedText {
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub text_detection: RawText,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawText {
    pub detected_text: String,
    /// `LINE` or `WORD`.
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub geometry: RawGeometry,
}

// --- face detection --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacePage {
    #[serde(default)]
    pub faces: Vec<TimedFace>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimedFace {
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub face: RawFace,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawFace {
    /// Set when the provider recognised the person.
    #[serde(default)]
    pub name: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub geometry: RawGeometry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn polygon_wins_over_box() {
        let geometry: RawGeometry = serde_json::from_value(json!({
            "BoundingBox": {"Width": 1.0, "Height": 1.0, "Left": 0.0, "Top": 0.0},
            "Polygon": [{"X": 0.1, "Y": 0.1}, {"X": 0.2, "Y": 0.1}, {"X": 0.2, "Y": 0.2}]
        }))
        .unwrap();

        assert!(matches!(
            geometry.to_provider_geometry(),
            Some(ProviderGeometry::Polygon(ref v)) if v.len() == 3
        ));
    }

    #[test]
    fn missing_geometry_is_none() {
        assert!(RawGeometry::default().to_provider_geometry().is_none());
    }

    #[test]
    fn label_page_parses_with_optional_fields() {
        let page: LabelPage = serde_json::from_value(json!({
            "Labels": [
                {"Timestamp": 1000, "Label": {"Name": "Car", "Confidence": 97.5}},
                {"Label": {"Name": "Road", "Confidence": 60.0, "Instances": [{}]}}
            ],
            "VideoMetadata": {"Codec": "h264"}
        }))
        .unwrap();

        assert_eq!(page.labels.len(), 2);
        assert_eq!(page.labels[0].timestamp, Some(1000));
        assert_eq!(page.labels[1].label.instances.len(), 1);
    }
}
