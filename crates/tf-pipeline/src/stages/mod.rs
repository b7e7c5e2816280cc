//! Channel-consuming stages.

pub mod join;
pub mod notify;
pub mod worker;

pub use join::{run_sweeper, JoinHandler};
pub use notify::Notifier;
pub use worker::{BranchWorker, SIMULATED_FAILURE};
