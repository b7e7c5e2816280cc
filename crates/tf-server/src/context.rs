//! Application context shared by every route handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tf_core::config::Config;
use tf_core::events::EventBus;
use tf_pipeline::{JoinBarrier, Pipeline, Readiness, Submitter};
use tf_transform::ToolInfo;

/// Handles into the running pipeline, cloned into Axum state.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub event_bus: Arc<EventBus>,
    pub readiness: Arc<Readiness>,
    pub submitter: Arc<Submitter>,
    pub barrier: Arc<JoinBarrier>,
    /// External tools found at startup.
    pub tools: Arc<Vec<ToolInfo>>,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub fn new(config: Arc<Config>, pipeline: &Pipeline, tools: Vec<ToolInfo>) -> Self {
        Self {
            config,
            event_bus: pipeline.events(),
            readiness: pipeline.readiness(),
            submitter: pipeline.submitter(),
            barrier: pipeline.barrier(),
            tools: Arc::new(tools),
            started_at: Utc::now(),
        }
    }
}
