//! Operator health summary.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use tf_transform::ToolInfo;

use crate::context::AppContext;

/// Barrier counters as exposed over HTTP.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JoinCounters {
    pub in_flight: usize,
    pub tombstones: usize,
    pub fired: u64,
    pub expired: u64,
    pub duplicates: u64,
    pub late: u64,
    pub rejected: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub engine_ready: bool,
    pub fault_mode: bool,
    pub joins: JoinCounters,
    pub tools: Vec<ToolInfo>,
    pub recent_events: usize,
}

/// GET /api/health
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Pipeline status", body = HealthResponse))
)]
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let stats = ctx.barrier.stats();
    let ready = ctx.readiness.is_ready();
    Json(HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - ctx.started_at).num_seconds(),
        engine_ready: ctx.readiness.engine_ready(),
        fault_mode: ctx.readiness.fault_mode(),
        joins: JoinCounters {
            in_flight: stats.in_flight,
            tombstones: stats.tombstones,
            fired: stats.fired,
            expired: stats.expired,
            duplicates: stats.duplicates,
            late: stats.late,
            rejected: stats.rejected,
        },
        tools: ctx.tools.as_ref().clone(),
        recent_events: ctx.event_bus.recent_events(usize::MAX).len(),
    })
}
