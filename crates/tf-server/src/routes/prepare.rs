//! Job submission.
//!
//! Unlike the JSON API, this route answers failures with a plain-text `500`
//! carrying the reason, which is what upload clients of the pipeline expect.

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use tf_core::{Branch, Error, Route};
use tf_pipeline::submit::MISSING_FILE_NAME;

use crate::context::AppContext;

/// Query parameters for `POST /prepare`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PrepareQuery {
    /// Address notified once the job resolves.
    pub email: Option<String>,
}

/// Acknowledgement for an accepted upload.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PrepareResponse {
    pub message: String,
    pub job_id: String,
    pub route: Route,
    pub branches: Vec<Branch>,
}

struct Upload {
    file_name: Option<String>,
    data: Bytes,
}

/// Take the first multipart field carrying a file name.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Invalid multipart body: {e}"))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Failed to read upload: {e}"))?;
        return Ok(Upload {
            file_name: Some(file_name),
            data,
        });
    }
    Ok(Upload {
        file_name: None,
        data: Bytes::new(),
    })
}

fn failure(reason: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
}

/// POST /prepare?email=
#[utoipa::path(
    post,
    path = "/prepare",
    params(PrepareQuery),
    request_body(content_type = "multipart/form-data", description = "The media file"),
    responses(
        (status = 200, description = "Stored and dispatched", body = PrepareResponse),
        (status = 500, description = "Missing file or e-mail, or storage failure", body = String)
    )
)]
pub async fn prepare(
    State(ctx): State<AppContext>,
    Query(query): Query<PrepareQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match multipart {
        Ok(multipart) => match read_upload(multipart).await {
            Ok(upload) => upload,
            Err(reason) => return failure(reason),
        },
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Not a multipart upload");
            return failure(MISSING_FILE_NAME.to_string());
        }
    };

    match ctx
        .submitter
        .submit(upload.file_name.as_deref(), query.email.as_deref(), upload.data)
        .await
    {
        Ok(accepted) => Json(PrepareResponse {
            message: "Data Received".to_string(),
            job_id: accepted.job.id.to_string(),
            route: accepted.route,
            branches: accepted.job.expected.iter().collect(),
        })
        .into_response(),
        Err(Error::Validation(reason)) => failure(reason),
        Err(e) => failure(e.to_string()),
    }
}
