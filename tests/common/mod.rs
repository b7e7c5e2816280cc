//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which assembles the whole pipeline over an
//! in-memory transport, an in-memory blob store, the passthrough engine and
//! a recording mailer. The [`TestHarness::with_server`] constructor also
//! starts Axum on a random port for HTTP-level testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tf_blob::{BlobStore, MemoryBlobStore};
use tf_channel::MemoryTransport;
use tf_core::config::Config;
use tf_core::events::{EventBus, EventPayload};
use tf_core::{Error, Result};
use tf_pipeline::{MailMessage, Mailer, Pipeline, PipelineDeps};
use tf_server::context::AppContext;
use tf_server::router::build_router;
use tf_transform::{PassthroughEngine, TransformEngine};

/// Mailer that keeps every message it is asked to deliver.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, message: &MailMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Blob store whose every operation fails.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        Err(unreachable_store(container, ""))
    }

    async fn put(&self, container: &str, object: &str, _data: Bytes) -> Result<()> {
        Err(unreachable_store(container, object))
    }

    async fn get(&self, container: &str, object: &str) -> Result<Bytes> {
        Err(unreachable_store(container, object))
    }

    fn url_for(&self, container: &str, object: &str) -> String {
        format!("failing://{container}/{object}")
    }
}

fn unreachable_store(container: &str, object: &str) -> Error {
    Error::Storage {
        container: container.to_string(),
        object: object.to_string(),
        message: "storage account unreachable".into(),
    }
}

/// Configuration tuned for fast tests: in-memory storage, short join
/// timeout, fast retries.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config.storage.root = None;
    config.transform.engine = "passthrough".into();
    config.join.timeout_secs = 1;
    config.join.sweep_interval_secs = 1;
    config.consumer.max_attempts = 3;
    config.consumer.retry_backoff_ms = 10;
    config
}

/// A running pipeline plus handles to its in-memory collaborators.
pub struct TestHarness {
    pub pipeline: Pipeline,
    pub ctx: AppContext,
    pub transport: Arc<MemoryTransport>,
    pub mailer: Arc<RecordingMailer>,
    pub cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TestHarness {
    /// Start a pipeline with [`test_config`] and an in-memory blob store.
    pub async fn new() -> Self {
        Self::with_parts(
            test_config(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(PassthroughEngine::new()),
        )
        .await
    }

    /// Start a pipeline with custom configuration and collaborators.
    pub async fn with_parts(
        config: Config,
        blobs: Arc<dyn BlobStore>,
        engine: Arc<dyn TransformEngine>,
    ) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(MemoryTransport::new(config.channels.partitions));
        let mailer = Arc::new(RecordingMailer::default());
        let deps = PipelineDeps {
            transport: transport.clone(),
            blobs,
            engine,
            mailer: mailer.clone(),
        };
        let events = Arc::new(EventBus::new(config.channels.event_capacity));
        let pipeline = Pipeline::build(config.clone(), deps, events)
            .await
            .expect("failed to build pipeline");
        let ctx = AppContext::new(config, &pipeline, Vec::new());

        let cancel = CancellationToken::new();
        let handles = pipeline
            .spawn(cancel.clone())
            .await
            .expect("failed to spawn pipeline");

        Self {
            pipeline,
            ctx,
            transport,
            mailer,
            cancel,
            handles,
        }
    }

    /// Start a default pipeline and serve its router on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::new().await).await
    }

    /// Serve an already-started harness on a random port.
    pub async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let cancel = harness.cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .ok();
        });

        (harness, addr)
    }

    /// Wait until the engine warm-up has finished.
    pub async fn wait_ready(&self) {
        let readiness = self.pipeline.readiness();
        wait_until(Duration::from_secs(5), || readiness.is_ready()).await;
    }

    /// Wait until at least `n` mails have been delivered and return them.
    pub async fn wait_for_mail(&self, n: usize) -> Vec<MailMessage> {
        let mailer = self.mailer.clone();
        wait_until(Duration::from_secs(10), || mailer.sent().len() >= n).await;
        self.mailer.sent()
    }

    /// Activity payloads recorded so far, oldest first.
    pub fn payloads(&self) -> Vec<EventPayload> {
        self.ctx
            .event_bus
            .recent_events(usize::MAX)
            .into_iter()
            .rev()
            .map(|e| e.payload)
            .collect()
    }

    /// Stop every stage and wait for the tasks to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll `condition` until it holds, panicking after `limit`.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {limit:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
