//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::status::alive,
        routes::status::ready,
        routes::status::fault_mode_on,
        routes::status::fault_mode_off,
        routes::prepare::prepare,
        routes::joins::list_joins,
        routes::joins::get_join,
        routes::health::health,
    ),
    components(schemas(
        routes::prepare::PrepareResponse,
        routes::joins::JoinResponse,
        routes::health::HealthResponse,
        routes::health::JoinCounters,
        tf_core::Branch,
        tf_core::Route,
        tf_transform::ToolInfo,
    ))
)]
struct ApiDoc;

/// GET /api/openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/events", get(routes::events::events_handler))
        .route("/joins", get(routes::joins::list_joins))
        .route("/joins/{id}", get(routes::joins::get_join))
        .route("/health", get(routes::health::health))
        .route("/openapi.json", get(openapi_json));

    let body_limit = ctx.config.server.max_upload_bytes;

    Router::new()
        .route("/alive", get(routes::status::alive))
        .route("/ready", get(routes::status::ready))
        .route("/prepare", post(routes::prepare::prepare))
        .route("/fakeerrormodeon", post(routes::status::fault_mode_on))
        .route("/fakeerrormodeoff", post(routes::status::fault_mode_off))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use tf_blob::MemoryBlobStore;
    use tf_channel::MemoryTransport;
    use tf_core::config::Config;
    use tf_core::events::EventBus;
    use tf_pipeline::{LogMailer, Pipeline, PipelineDeps};
    use tf_transform::PassthroughEngine;

    async fn test_router() -> (Router, AppContext) {
        let mut config = Config::default();
        config.storage.root = None;
        let config = Arc::new(config);
        let deps = PipelineDeps {
            transport: Arc::new(MemoryTransport::new(1)),
            blobs: Arc::new(MemoryBlobStore::new()),
            engine: Arc::new(PassthroughEngine::new()),
            mailer: Arc::new(LogMailer),
        };
        let pipeline = Pipeline::build(config.clone(), deps, Arc::new(EventBus::default()))
            .await
            .unwrap();
        let ctx = AppContext::new(config, &pipeline, Vec::new());
        (build_router(ctx.clone()), ctx)
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn alive_is_ok() {
        let (app, _) = test_router().await;
        let resp = app
            .oneshot(Request::get("/alive").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "OK");
    }

    #[tokio::test]
    async fn ready_without_warmup_is_busy() {
        // Nothing spawned, so the engine never reports ready.
        let (app, _) = test_router().await;
        let resp = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(resp).await, "BUSY");
    }

    #[tokio::test]
    async fn fault_toggles_flip_readiness_flag() {
        let (app, ctx) = test_router().await;
        let resp = app
            .clone()
            .oneshot(
                Request::post("/fakeerrormodeon")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_text(resp).await, "Fake error mode ON");
        assert!(ctx.readiness.fault_mode());

        app.oneshot(
            Request::post("/fakeerrormodeoff")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert!(!ctx.readiness.fault_mode());
    }

    #[tokio::test]
    async fn prepare_missing_email_is_plain_500() {
        let (app, _) = test_router().await;
        let body = "--XBOUNDARY\r\n\
                    Content-Disposition: form-data; name=\"file\"; filename=\"photo.jpg\"\r\n\
                    Content-Type: application/octet-stream\r\n\r\n\
                    abc\r\n\
                    --XBOUNDARY--\r\n";
        let resp = app
            .oneshot(
                Request::post("/prepare")
                    .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(resp).await,
            tf_pipeline::submit::MISSING_EMAIL
        );
    }

    #[tokio::test]
    async fn unknown_join_is_json_404() {
        let (app, _) = test_router().await;
        let uri = format!("/api/joins/{}", tf_core::JobId::new());
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["code"], "not_found");
    }
}
