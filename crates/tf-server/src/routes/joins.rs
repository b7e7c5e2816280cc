//! In-flight join introspection.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use tf_core::{Branch, Error, JobId};
use tf_pipeline::JoinSnapshot;

use crate::context::AppContext;
use crate::error::AppError;

/// One job the barrier is still waiting on.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JoinResponse {
    pub job_id: String,
    pub file_name: String,
    pub expected: Vec<Branch>,
    pub received: Vec<Branch>,
    pub failed: Vec<Branch>,
    pub missing: Vec<Branch>,
    pub first_seen: String,
    pub age_secs: u64,
}

impl From<JoinSnapshot> for JoinResponse {
    fn from(s: JoinSnapshot) -> Self {
        Self {
            job_id: s.job_id.to_string(),
            file_name: s.file_name,
            missing: s.expected.missing_from(s.received.iter()),
            expected: s.expected.iter().collect(),
            received: s.received,
            failed: s.failed,
            first_seen: s.first_seen.to_rfc3339(),
            age_secs: s.age_secs,
        }
    }
}

/// GET /api/joins
#[utoipa::path(
    get,
    path = "/api/joins",
    responses((status = 200, description = "In-flight joins, oldest first", body = Vec<JoinResponse>))
)]
pub async fn list_joins(State(ctx): State<AppContext>) -> Json<Vec<JoinResponse>> {
    Json(
        ctx.barrier
            .snapshot()
            .into_iter()
            .map(JoinResponse::from)
            .collect(),
    )
}

/// GET /api/joins/{id}
#[utoipa::path(
    get,
    path = "/api/joins/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "The in-flight join", body = JoinResponse),
        (status = 400, description = "Malformed job id"),
        (status = 404, description = "No open join for this job")
    )
)]
pub async fn get_join(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JoinResponse>, AppError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| Error::Validation(format!("invalid job id '{id}'")))?;
    let snapshot = ctx
        .barrier
        .get(job_id)
        .ok_or_else(|| Error::not_found("join", job_id))?;
    Ok(Json(snapshot.into()))
}
