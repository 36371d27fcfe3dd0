//! Payload archives: where raw provider results are kept for later audit.

mod fs;
mod in_memory;

pub use fs::FsPayloadArchive;
pub use in_memory::InMemoryPayloadArchive;
