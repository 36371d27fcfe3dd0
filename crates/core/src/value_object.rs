//! Value objects: equality by value, not identity.
//!
//! The decoded result model is built from small immutable values. Each one
//! validates itself on construction so downstream code never sees, say, a
//! confidence of `97.5` that was never rescaled.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Confidence score on the unit interval `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);
    pub const ONE: Confidence = Confidence(1.0);

    /// Build a confidence already expressed on the unit interval.
    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::validation(format!(
                "confidence {value} is outside [0, 1]"
            )));
        }
        Ok(Self(value))
    }

    /// Rescale a provider confidence expressed on a 0–100 scale.
    pub fn from_percent(percent: f64) -> DomainResult<Self> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(DomainError::validation(format!(
                "confidence {percent} is outside [0, 100]"
            )));
        }
        Ok(Self(percent / 100.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Inclusive threshold check: a confidence equal to `threshold` passes.
    pub fn meets(self, threshold: Confidence) -> bool {
        self.0 >= threshold.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

impl ValueObject for Confidence {}

/// A point in relative image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl ValueObject for Point {}

/// Axis-aligned box in relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
}

impl BoundingBox {
    pub const VERTEX_COUNT: usize = 4;

    pub fn new(width: f64, height: f64, left: f64, top: f64) -> Self {
        Self {
            width,
            height,
            left,
            top,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Box spanned by two opposite corners, given in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        Self::new((a.x - b.x).abs(), (a.y - b.y).abs(), left, top)
    }

    /// Bounds of a quadrilateral. Any other vertex count yields the zero box.
    pub fn from_polygon(vertices: &[Point]) -> Self {
        if vertices.len() != Self::VERTEX_COUNT {
            return Self::zero();
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in vertices {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Self::new(max_x - min_x, max_y - min_y, min_x, min_y)
    }
}

impl ValueObject for BoundingBox {}
