//! `jobrelay-infra`
//!
//! Stateful side of the engine:
//! - correlation stores (in-memory, Redis)
//! - job submission with bounded retries
//! - notification dispatch and the worker pool that drives it
//! - result persistence (in-memory, Postgres) and payload archives
//! - configuration and the `Engine` that wires it all together

pub mod archive;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod engine;
pub mod event_bus;
pub mod lifecycle;
pub mod persist;
pub mod submit;
pub mod workers;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineError};

#[cfg(test)]
mod integration_tests;
