//! Normalization of provider-native confidence and geometry.

use jobrelay_core::{BoundingBox, Confidence, DecodeOptions, Point};

use crate::handler::DecodeError;

/// Geometry as providers describe it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderGeometry {
    /// Already axis-aligned.
    Box(BoundingBox),
    /// Two opposite corners.
    Corners(Point, Point),
    /// Arbitrary polygon; only quadrilaterals are meaningful.
    Polygon(Vec<Point>),
}

impl ProviderGeometry {
    pub fn normalize(&self) -> BoundingBox {
        match self {
            ProviderGeometry::Box(b) => *b,
            ProviderGeometry::Corners(a, b) => BoundingBox::from_corners(*a, *b),
            ProviderGeometry::Polygon(vertices) => BoundingBox::from_polygon(vertices),
        }
    }
}

/// Rescale a 0–100 provider confidence, treating out-of-range values as malformed payload.
pub fn percent_confidence(percent: f64) -> Result<Confidence, DecodeError> {
    Confidence::from_percent(percent).map_err(|e| DecodeError::malformed(e.to_string()))
}

/// Confidence threshold plus result cap applied to decoded items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub min_confidence: Confidence,
    pub max_results: Option<usize>,
}

impl Selection {
    /// Options stored with the job win over the handler's default threshold.
    pub fn from_options(options: &DecodeOptions, default_min_confidence: Confidence) -> Self {
        Self {
            min_confidence: options.min_confidence.unwrap_or(default_min_confidence),
            max_results: options.max_results,
        }
    }

    /// Keep items at or above the threshold, then cap, preserving provider order.
    pub fn apply<T>(&self, items: Vec<T>, confidence: impl Fn(&T) -> Confidence) -> Vec<T> {
        let mut kept: Vec<T> = items
            .into_iter()
            .filter(|item| confidence(item).meets(self.min_confidence))
            .collect();

        if let Some(max) = self.max_results {
            kept.truncate(max);
        }

        kept
    }
}
