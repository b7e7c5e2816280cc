//! Liveness, readiness and fault-mode toggles.

use axum::extract::State;
use axum::http::StatusCode;

use crate::context::AppContext;

/// GET /alive
#[utoipa::path(
    get,
    path = "/alive",
    responses((status = 200, description = "Process is up", body = String))
)]
pub async fn alive() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// GET /ready
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Transform engine initialized", body = String),
        (status = 503, description = "Still initializing or in fault mode", body = String)
    )
)]
pub async fn ready(State(ctx): State<AppContext>) -> (StatusCode, &'static str) {
    if ctx.readiness.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "BUSY")
    }
}

/// POST /fakeerrormodeon
#[utoipa::path(
    post,
    path = "/fakeerrormodeon",
    responses((status = 200, description = "Branch workers now fail every request", body = String))
)]
pub async fn fault_mode_on(State(ctx): State<AppContext>) -> (StatusCode, &'static str) {
    ctx.readiness.set_fault_mode(true);
    tracing::warn!("Fault mode enabled");
    (StatusCode::OK, "Fake error mode ON")
}

/// POST /fakeerrormodeoff
#[utoipa::path(
    post,
    path = "/fakeerrormodeoff",
    responses((status = 200, description = "Branch workers back to normal", body = String))
)]
pub async fn fault_mode_off(State(ctx): State<AppContext>) -> (StatusCode, &'static str) {
    ctx.readiness.set_fault_mode(false);
    tracing::info!("Fault mode disabled");
    (StatusCode::OK, "Fake error mode OFF")
}
