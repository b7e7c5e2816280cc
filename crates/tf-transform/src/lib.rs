//! # tf-transform
//!
//! External media transforms for the branch workers.
//!
//! - **[`TransformEngine`]** -- prepare once, then run transforms to
//!   completion and collect `{exit code, artifact bytes, logs}`.
//! - **[`FfmpegEngine`]** -- runs ffmpeg in a scratch directory.
//! - **[`PassthroughEngine`]** -- tool-free engine for demos and tests.
//! - **[`ToolCommand`]** -- async process builder with timeout support.
//! - **[`recipe`]** -- the ffmpeg command line for each branch.

pub mod command;
pub mod engine;
pub mod ffmpeg;
pub mod passthrough;
pub mod recipe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use engine::{TransformEngine, TransformOutput, TransformSpec};
pub use ffmpeg::FfmpegEngine;
pub use passthrough::PassthroughEngine;
pub use recipe::RecipeOptions;
pub use tools::ToolInfo;
