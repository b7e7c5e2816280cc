//! tf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other tf-* crates,
//! providing the job identifier, a unified error type, the pipeline message
//! model exchanged over channels, application configuration, and a broadcast
//! activity bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use model::*;
