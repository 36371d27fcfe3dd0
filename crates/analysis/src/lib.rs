//! `jobrelay-analysis`
//!
//! **Responsibility:** turning a finished provider job into normalized output.
//!
//! This crate does not talk to the correlation store or the downstream store:
//! - It fetches raw results through the [`ResultSource`] seam.
//! - It archives the raw payload through the [`PayloadArchive`] seam.
//! - It emits [`DecodedResult`](jobrelay_core::DecodedResult)s, never persisting them.

pub mod decoders;
pub mod handler;
pub mod normalize;
pub mod provider;
pub mod registry;
pub mod source;

pub use decoders::{FaceDetectionHandler, LabelDetectionHandler, TextDetectionHandler};
pub use handler::{DecodeError, ResultHandler};
pub use normalize::{ProviderGeometry, Selection};
pub use registry::{HandlerRegistry, RegistryError};
pub use source::{ArchiveError, PayloadArchive, RawPage, ResultSource, collect_pages};
