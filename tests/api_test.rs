//! API integration tests.
//!
//! Exercises the HTTP surface against a [`TestHarness`] server running on a
//! random port over an in-memory pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};

use common::{test_config, FailingBlobStore, TestHarness};
use tf_core::NOTIFY_CHANNEL;
use tf_pipeline::submit::{MISSING_EMAIL, MISSING_FILE_NAME};
use tf_transform::PassthroughEngine;

fn upload(file_name: &str) -> Form {
    Form::new().part(
        "file",
        Part::bytes(b"media bytes".to_vec()).file_name(file_name.to_string()),
    )
}

// ---------------------------------------------------------------------------
// Liveness and readiness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alive_returns_ok() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/alive")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn ready_reports_busy_until_warm() {
    let h = TestHarness::with_parts(
        test_config(),
        Arc::new(tf_blob::MemoryBlobStore::new()),
        Arc::new(PassthroughEngine::new().with_warmup(Duration::from_millis(300))),
    )
    .await;
    let (h, addr) = TestHarness::serve(h).await;
    let url = format!("http://{addr}/ready");

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.text().await.unwrap(), "BUSY");

    h.wait_ready().await;
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn fault_mode_toggles_readiness() {
    let (h, addr) = TestHarness::with_server().await;
    h.wait_ready().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/fakeerrormodeon"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "Fake error mode ON");

    let resp = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
    assert_eq!(resp.status(), 503);

    let resp = client
        .post(format!("http://{addr}/fakeerrormodeoff"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "Fake error mode OFF");

    let resp = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prepare_accepts_upload() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/prepare?email=user@example.com"))
        .multipart(upload("clip.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["message"], "Data Received");
    assert_eq!(json["route"], "video");
    assert_eq!(json["branches"].as_array().unwrap().len(), 2);
    assert!(!json["job_id"].as_str().unwrap().is_empty());

    let mail = h.wait_for_mail(1).await;
    assert_eq!(mail[0].to, "user@example.com");
}

#[tokio::test]
async fn prepare_without_email_is_rejected() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/prepare"))
        .multipart(upload("photo.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.unwrap(), MISSING_EMAIL);
    assert_eq!(h.transport.depth(NOTIFY_CHANNEL), 0);
}

#[tokio::test]
async fn prepare_without_file_is_rejected() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    // A form field with no file name is not an upload.
    let form = Form::new().text("note", "hello");
    let resp = client
        .post(format!("http://{addr}/prepare?email=user@example.com"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.unwrap(), MISSING_FILE_NAME);

    // Not multipart at all.
    let resp = client
        .post(format!("http://{addr}/prepare?email=user@example.com"))
        .body("raw")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.unwrap(), MISSING_FILE_NAME);
}

#[tokio::test]
async fn prepare_reports_storage_failure() {
    let h = TestHarness::with_parts(
        test_config(),
        Arc::new(FailingBlobStore),
        Arc::new(PassthroughEngine::new()),
    )
    .await;
    let (h, addr) = TestHarness::serve(h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/prepare?email=user@example.com"))
        .multipart(upload("photo.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp.text().await.unwrap().contains("storage account unreachable"));

    for name in tf_pipeline::channel_names() {
        assert_eq!(h.transport.depth(name), 0);
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn joins_endpoint_lists_open_jobs() {
    let mut config = test_config();
    config.join.timeout_secs = 60;
    let h = TestHarness::with_parts(
        config,
        Arc::new(tf_blob::MemoryBlobStore::new()),
        Arc::new(PassthroughEngine::new()),
    )
    .await;
    let (h, addr) = TestHarness::serve(h).await;
    // Keep the animated preview from ever reporting so the join stays open.
    h.transport
        .set_unavailable(tf_core::Branch::AnimatedGif.completion_channel(), true);

    let accepted = h
        .ctx
        .submitter
        .submit(Some("clip.mp4"), Some("user@example.com"), bytes::Bytes::from_static(b"x"))
        .await
        .unwrap();
    let barrier = h.pipeline.barrier();
    // The job is registered at intake. Wait for the frame capture to land.
    common::wait_until(Duration::from_secs(5), || {
        barrier
            .get(accepted.job.id)
            .is_some_and(|snapshot| snapshot.received.len() == 1)
    })
    .await;

    let joins: serde_json::Value = reqwest::get(format!("http://{addr}/api/joins"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let joins = joins.as_array().unwrap();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0]["file_name"], "clip.mp4");
    assert_eq!(joins[0]["missing"], serde_json::json!(["animated_gif"]));
    // Half a video job never notifies.
    assert_eq!(h.transport.depth(NOTIFY_CHANNEL), 0);

    let resp = reqwest::get(format!("http://{addr}/api/joins/{}", accepted.job.id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_join_is_404_and_bad_id_is_400() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!(
        "http://{addr}/api/joins/00000000-0000-0000-0000-000000000000"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "not_found");

    let resp = reqwest::get(format!("http://{addr}/api/joins/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn health_summarizes_pipeline() {
    let (h, addr) = TestHarness::with_server().await;
    h.wait_ready().await;

    let json: serde_json::Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["engine_ready"], true);
    assert_eq!(json["fault_mode"], false);
    assert_eq!(json["joins"]["in_flight"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (_h, addr) = TestHarness::with_server().await;
    let json: serde_json::Value = reqwest::get(format!("http://{addr}/api/openapi.json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(json["paths"]["/prepare"].is_object());
    assert!(json["paths"]["/api/joins/{id}"].is_object());
}

// ---------------------------------------------------------------------------
// SSE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sse_stream_connects() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/events?category=join"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(ct.contains("text/event-stream"), "expected SSE content-type, got: {ct}");
}

#[tokio::test]
async fn sse_replays_recent_activity() {
    let (h, addr) = TestHarness::with_server().await;
    h.ctx
        .submitter
        .submit(Some("archive.zip"), Some("user@example.com"), bytes::Bytes::new())
        .await
        .unwrap();

    let mut resp = reqwest::get(format!("http://{addr}/api/events?category=intake"))
        .await
        .unwrap();
    let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
        .await
        .expect("no SSE data")
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("job_accepted"), "unexpected first chunk: {text}");
}
