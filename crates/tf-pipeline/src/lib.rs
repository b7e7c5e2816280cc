//! # tf-pipeline
//!
//! Fan-out/fan-in orchestration of media jobs.
//!
//! This crate provides:
//!
//! - **[`Classifier`]** -- routes a file name to unsupported, image or video.
//! - **[`Submitter`]** -- validates and stores an upload, then hands it to
//!   the [`Dispatcher`], which publishes one request per expected branch (or
//!   a short-circuit notification).
//! - **[`BranchWorker`]** -- runs one transform per request and always
//!   publishes a completion, success or failure.
//! - **[`JoinBarrier`]** -- per-job fan-in that fires exactly once when every
//!   expected branch has reported, with deadline expiry and tombstones.
//! - **[`Notifier`]** and **[`Mailer`]** -- outbound mail for terminal events.
//! - **[`run_consumer`]** -- the at-least-once partition consumer loop.
//! - **[`Pipeline`]** -- wires all of the above over a channel transport.

pub mod classify;
pub mod consumer;
pub mod dispatch;
pub mod join;
pub mod mail;
pub mod readiness;
pub mod runtime;
pub mod stages;
pub mod submit;

// Re-export key types at the crate root.
pub use classify::{Classification, Classifier};
pub use consumer::{run_consumer, MessageHandler, RetryPolicy};
pub use dispatch::{DispatchReport, Dispatcher, PublishFailure};
pub use join::{ExpiredJoin, JoinBarrier, JoinDecision, JoinSnapshot, JoinStats};
pub use mail::{LogMailer, MailMessage, Mailer, RelayMailer};
pub use readiness::Readiness;
pub use runtime::{channel_names, Pipeline, PipelineDeps};
pub use stages::{BranchWorker, JoinHandler, Notifier};
pub use submit::{Accepted, Submitter};
