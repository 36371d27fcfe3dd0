//! Process-wide tracing setup shared by every binary embedding the engine.

/// Initialize tracing with the format chosen by `JOBRELAY_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::LogFormat;
