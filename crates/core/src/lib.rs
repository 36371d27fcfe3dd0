//! `jobrelay-core`: shared building blocks for the correlation engine.
//!
//! This crate contains **pure** types (no IO): identifiers, job kinds, the
//! versioned job context stored alongside each in-flight job, and the
//! normalized result model produced by decoders.

pub mod context;
pub mod error;
pub mod id;
pub mod kind;
pub mod result;
pub mod value_object;

pub use context::{CONTEXT_VERSION, DecodeOptions, JobContext};
pub use error::{DomainError, DomainResult};
pub use id::{JobId, PayloadRef, TargetRef};
pub use kind::JobKind;
pub use result::{DecodedResult, Label, Tag};
pub use value_object::{BoundingBox, Confidence, Point, ValueObject};
