//! Branch worker: one external transform per request.

use std::sync::Arc;

use async_trait::async_trait;

use tf_blob::BlobStore;
use tf_channel::{decode, publish_json, ChannelProducer, Envelope};
use tf_core::events::{EventBus, EventPayload};
use tf_core::{object_name, Branch, BranchOutcome, BranchRequest, Result};
use tf_transform::{recipe, RecipeOptions, TransformEngine, TransformSpec};

use crate::consumer::MessageHandler;
use crate::readiness::Readiness;

/// Failure reason used while fault mode is on.
pub const SIMULATED_FAILURE: &str = "simulated failure";

/// Consumes one branch's input channel and publishes exactly one completion
/// per request, success or failure.
pub struct BranchWorker {
    branch: Branch,
    blobs: Arc<dyn BlobStore>,
    container: String,
    engine: Arc<dyn TransformEngine>,
    recipe: RecipeOptions,
    completions: Arc<dyn ChannelProducer>,
    readiness: Arc<Readiness>,
    events: Arc<EventBus>,
}

impl BranchWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        branch: Branch,
        blobs: Arc<dyn BlobStore>,
        container: impl Into<String>,
        engine: Arc<dyn TransformEngine>,
        recipe: RecipeOptions,
        completions: Arc<dyn ChannelProducer>,
        readiness: Arc<Readiness>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            branch,
            blobs,
            container: container.into(),
            engine,
            recipe,
            completions,
            readiness,
            events,
        }
    }

    /// Run the transform for `request`, folding every failure into the
    /// outcome so the join can still resolve.
    pub async fn process(&self, request: &BranchRequest) -> BranchOutcome {
        if self.readiness.fault_mode() {
            return BranchOutcome::Failed {
                reason: SIMULATED_FAILURE.to_string(),
            };
        }

        let input = match self.blobs.get(&self.container, &request.object).await {
            Ok(data) => data,
            Err(e) => {
                return BranchOutcome::Failed {
                    reason: format!("could not read upload: {e}"),
                }
            }
        };

        let artifact = self.branch.artifact_name(&request.file_name);
        let spec = TransformSpec {
            branch: self.branch,
            input_name: request.file_name.clone(),
            input,
            output_name: artifact.clone(),
            args: recipe::ffmpeg_args(self.branch, &self.recipe),
        };

        let output = match self.engine.run_to_completion(spec).await {
            Ok(output) => output,
            Err(e) => {
                return BranchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        let Some(data) = output.output.clone().filter(|_| output.succeeded()) else {
            return BranchOutcome::Failed {
                reason: output.failure_reason(),
            };
        };

        let object = object_name(request.job_id, &artifact);
        if let Err(e) = self.blobs.put(&self.container, &object, data).await {
            return BranchOutcome::Failed {
                reason: format!("could not store artifact: {e}"),
            };
        }
        BranchOutcome::Succeeded {
            artifact: self.blobs.url_for(&self.container, &object),
        }
    }
}

#[async_trait]
impl MessageHandler for BranchWorker {
    fn name(&self) -> &'static str {
        self.branch.as_str()
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let request: BranchRequest = decode(envelope)?;
        let outcome = if request.branch == self.branch {
            self.process(&request).await
        } else {
            // Misrouted. Report the branch as failed so the job still joins.
            tracing::error!(
                job_id = %request.job_id,
                branch = %request.branch,
                worker = %self.branch,
                "Request for another branch"
            );
            BranchOutcome::Failed {
                reason: format!("{} request delivered to {} worker", request.branch, self.branch),
            }
        };
        let success = outcome.is_success();
        let detail = match &outcome {
            BranchOutcome::Succeeded { artifact } => artifact.clone(),
            BranchOutcome::Failed { reason } => reason.clone(),
        };

        if success {
            tracing::info!(job_id = %request.job_id, branch = %request.branch, artifact = %detail, "Branch succeeded");
        } else {
            tracing::warn!(job_id = %request.job_id, branch = %request.branch, reason = %detail, "Branch failed");
        }

        // A publish error propagates so the consumer retries the request
        // instead of committing past a job that never reported.
        let completion = request.complete(outcome);
        publish_json(
            self.completions.as_ref(),
            &request.job_id.to_string(),
            &completion,
        )
        .await?;

        self.events.broadcast(EventPayload::BranchCompleted {
            job_id: request.job_id,
            branch: request.branch,
            success,
            detail,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use tf_blob::MemoryBlobStore;
    use tf_channel::{ChannelTransport, MemoryTransport};
    use tf_core::{BranchCompletion, BranchSet, JobId};
    use tf_transform::PassthroughEngine;

    struct Fixture {
        transport: MemoryTransport,
        blobs: Arc<MemoryBlobStore>,
        readiness: Arc<Readiness>,
    }

    impl Fixture {
        async fn new() -> Self {
            let transport = MemoryTransport::new(1);
            for branch in Branch::ALL {
                transport.open(branch.input_channel()).await.unwrap();
                transport.open(branch.completion_channel()).await.unwrap();
            }
            let blobs = Arc::new(MemoryBlobStore::new());
            blobs.ensure_container("jobs").await.unwrap();
            Self {
                transport,
                blobs,
                readiness: Arc::new(Readiness::new()),
            }
        }

        async fn worker(&self, branch: Branch, engine: PassthroughEngine) -> BranchWorker {
            let producer = self
                .transport
                .create_producer(branch.completion_channel())
                .await
                .unwrap();
            BranchWorker::new(
                branch,
                self.blobs.clone(),
                "jobs",
                Arc::new(engine),
                RecipeOptions::default(),
                producer,
                self.readiness.clone(),
                Arc::new(EventBus::default()),
            )
        }

        async fn request(&self, branch: Branch, file: &str, upload: bool) -> Envelope {
            let job_id = JobId::new();
            let object = object_name(job_id, file);
            if upload {
                self.blobs
                    .put("jobs", &object, Bytes::from_static(b"media"))
                    .await
                    .unwrap();
            }
            let request = BranchRequest {
                job_id,
                file_name: file.into(),
                email: "a@x.com".into(),
                object,
                branch,
                expected: BranchSet::single(branch),
                submitted_at: Utc::now(),
            };
            let producer = self
                .transport
                .create_producer(branch.input_channel())
                .await
                .unwrap();
            publish_json(producer.as_ref(), &job_id.to_string(), &request)
                .await
                .unwrap();
            self.transport
                .messages(branch.input_channel())
                .pop()
                .unwrap()
        }

        fn completions(&self, branch: Branch) -> Vec<BranchCompletion> {
            self.transport
                .messages(branch.completion_channel())
                .iter()
                .map(|e| decode(e).unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn success_stores_artifact_and_publishes() {
        let f = Fixture::new().await;
        let worker = f.worker(Branch::Thumbnail, PassthroughEngine::new()).await;
        let envelope = f.request(Branch::Thumbnail, "photo.jpg", true).await;

        worker.handle(&envelope).await.unwrap();

        let completions = f.completions(Branch::Thumbnail);
        assert_eq!(completions.len(), 1);
        let c = &completions[0];
        assert_eq!(c.file_name, "photo.jpg");
        match &c.outcome {
            BranchOutcome::Succeeded { artifact } => {
                assert!(artifact.ends_with("/photo_thumb.png"))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let stored = f.blobs.objects("jobs");
        assert!(stored.contains(&format!("{}/photo_thumb.png", c.job_id)));
    }

    #[tokio::test]
    async fn transform_failure_still_publishes() {
        let f = Fixture::new().await;
        let worker = f
            .worker(
                Branch::AnimatedGif,
                PassthroughEngine::new().failing(Branch::AnimatedGif),
            )
            .await;
        let envelope = f.request(Branch::AnimatedGif, "clip.mp4", true).await;

        worker.handle(&envelope).await.unwrap();

        let completions = f.completions(Branch::AnimatedGif);
        assert_eq!(completions.len(), 1);
        assert!(!completions[0].outcome.is_success());
    }

    #[tokio::test]
    async fn missing_upload_is_failure_completion() {
        let f = Fixture::new().await;
        let worker = f.worker(Branch::FrameCapture, PassthroughEngine::new()).await;
        let envelope = f.request(Branch::FrameCapture, "clip.mp4", false).await;

        worker.handle(&envelope).await.unwrap();

        match &f.completions(Branch::FrameCapture)[0].outcome {
            BranchOutcome::Failed { reason } => assert!(reason.contains("could not read upload")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn fault_mode_fails_without_running() {
        let f = Fixture::new().await;
        f.readiness.set_fault_mode(true);
        let worker = f.worker(Branch::Thumbnail, PassthroughEngine::new()).await;
        let envelope = f.request(Branch::Thumbnail, "photo.jpg", true).await;

        worker.handle(&envelope).await.unwrap();

        assert_eq!(
            f.completions(Branch::Thumbnail)[0].outcome,
            BranchOutcome::Failed {
                reason: SIMULATED_FAILURE.into()
            }
        );
        assert_eq!(f.blobs.objects("jobs").len(), 1);
    }

    #[tokio::test]
    async fn misrouted_request_reports_failed_branch() {
        let f = Fixture::new().await;
        let worker = f.worker(Branch::Thumbnail, PassthroughEngine::new()).await;
        let envelope = f.request(Branch::AnimatedGif, "clip.mp4", true).await;

        worker.handle(&envelope).await.unwrap();

        let completions = f.completions(Branch::Thumbnail);
        assert_eq!(completions.len(), 1);
        let c = &completions[0];
        assert_eq!(c.branch, Branch::AnimatedGif);
        match &c.outcome {
            BranchOutcome::Failed { reason } => assert!(reason.contains("thumbnail worker")),
            other => panic!("unexpected outcome {other:?}"),
        }
        // Nothing ran, so only the upload is stored.
        assert_eq!(f.blobs.objects("jobs").len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_retryable_error() {
        let f = Fixture::new().await;
        let worker = f.worker(Branch::Thumbnail, PassthroughEngine::new()).await;
        let envelope = f.request(Branch::Thumbnail, "photo.jpg", true).await;
        f.transport
            .set_unavailable(Branch::Thumbnail.completion_channel(), true);

        let err = worker.handle(&envelope).await.unwrap_err();
        assert!(!err.is_permanent());
        assert!(f.completions(Branch::Thumbnail).is_empty());
    }

    #[tokio::test]
    async fn garbage_payload_is_permanent_error() {
        let f = Fixture::new().await;
        let worker = f.worker(Branch::Thumbnail, PassthroughEngine::new()).await;
        let producer = f
            .transport
            .create_producer(Branch::Thumbnail.input_channel())
            .await
            .unwrap();
        producer.send("k", Bytes::from_static(b"{not json")).await.unwrap();
        let envelope = f
            .transport
            .messages(Branch::Thumbnail.input_channel())
            .pop()
            .unwrap();

        let err = worker.handle(&envelope).await.unwrap_err();
        assert!(err.is_permanent());
    }
}
