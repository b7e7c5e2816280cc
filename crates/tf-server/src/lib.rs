//! tf-server: HTTP surface and process wiring for thumbforge.
//!
//! This crate ties the pipeline crates together into one running process:
//!
//! - Chooses the channel transport, blob store, transform engine and mailer
//!   from configuration ([`build_deps`]).
//! - Axum routes for liveness and readiness, job submission, fault toggles,
//!   SSE activity and join introspection.
//! - Graceful shutdown via signal handling.

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tf_blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
use tf_channel::MemoryTransport;
use tf_core::config::Config;
use tf_core::events::EventBus;
use tf_core::Error;
use tf_pipeline::{LogMailer, Mailer, Pipeline, PipelineDeps, RelayMailer};
use tf_transform::{FfmpegEngine, PassthroughEngine, TransformEngine};

use crate::context::AppContext;

/// Select the pipeline's collaborators from `config`.
pub fn build_deps(config: &Config) -> tf_core::Result<PipelineDeps> {
    let blobs: Arc<dyn BlobStore> = match &config.storage.root {
        Some(root) => {
            let mut store = LocalBlobStore::new(root);
            if let Some(base) = &config.storage.public_base_url {
                store = store.with_public_base_url(base.clone());
            }
            tracing::info!(root = %root.display(), "Using filesystem blob store");
            Arc::new(store)
        }
        None => {
            tracing::info!("Using in-memory blob store");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let engine: Arc<dyn TransformEngine> = match config.transform.engine.as_str() {
        "ffmpeg" => Arc::new(FfmpegEngine::new(
            config.transform.ffmpeg_path.clone(),
            config.transform.timeout(),
        )),
        "passthrough" => Arc::new(PassthroughEngine::new()),
        other => {
            return Err(Error::Validation(format!(
                "unknown transform engine '{other}'"
            )))
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.mail.relay_url {
        Some(url) => Arc::new(RelayMailer::new(url.clone(), config.mail.relay_token.clone())),
        None => Arc::new(LogMailer),
    };

    Ok(PipelineDeps {
        transport: Arc::new(MemoryTransport::new(config.channels.partitions.max(1))),
        blobs,
        engine,
        mailer,
    })
}

/// Start thumbforge.
///
/// Builds the pipeline, spawns every stage and serves HTTP until a shutdown
/// signal is received, then waits for the stages to stop.
pub async fn start(config: Config) -> tf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let config = Arc::new(config);
    let deps = build_deps(&config)?;
    let events = Arc::new(EventBus::new(config.channels.event_capacity));
    let pipeline = Pipeline::build(config.clone(), deps, events).await?;

    let ffmpeg = tf_transform::tools::check("ffmpeg", config.transform.ffmpeg_path.as_deref()).await;
    if ffmpeg.available {
        tracing::info!(
            "Tool found: ffmpeg ({})",
            ffmpeg.version.as_deref().unwrap_or("unknown version")
        );
    } else {
        tracing::debug!("Tool not found: ffmpeg");
    }

    let ctx = AppContext::new(config.clone(), &pipeline, vec![ffmpeg]);

    let cancel = CancellationToken::new();
    let handles = pipeline.spawn(cancel.clone()).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid server address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Starting server on {addr}");

    let app = router::build_router(ctx);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Signal all stages to stop, then wait for them.
    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!("Stage task ended abnormally: {e}");
        }
    }

    served.map_err(|e| Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
