//! Job intake: validate, store, classify, fan out.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::OnceCell;

use tf_blob::BlobStore;
use tf_core::events::{EventBus, EventPayload};
use tf_core::{object_name, BranchSet, Error, Job, JobId, Result, Route};

use crate::classify::Classifier;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::join::JoinBarrier;

pub const MISSING_FILE_NAME: &str = "Please supply a filename";
pub const MISSING_EMAIL: &str =
    "Please supply an e-mail address as a query parameter to notify when the media has been processed.";

/// A job that was stored and dispatched.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub job: Job,
    pub route: Route,
    pub report: DispatchReport,
}

/// Entry point for new uploads.
pub struct Submitter {
    blobs: Arc<dyn BlobStore>,
    container: String,
    container_ready: OnceCell<()>,
    classifier: Classifier,
    dispatcher: Dispatcher,
    barrier: Arc<JoinBarrier>,
    events: Arc<EventBus>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Submitter {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        container: impl Into<String>,
        classifier: Classifier,
        dispatcher: Dispatcher,
        barrier: Arc<JoinBarrier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            blobs,
            container: container.into(),
            container_ready: OnceCell::new(),
            classifier,
            dispatcher,
            barrier,
            events,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Accept an upload.
    ///
    /// Input and storage errors are returned before anything is published.
    /// Once the upload is stored, routing always proceeds; publish failures
    /// are reported in [`Accepted::report`] rather than as an error.
    pub async fn submit(
        &self,
        file_name: Option<&str>,
        email: Option<&str>,
        data: Bytes,
    ) -> Result<Accepted> {
        let Some(file_name) = present(file_name) else {
            return Err(self.reject(None, MISSING_FILE_NAME));
        };
        let Some(email) = present(email) else {
            return Err(self.reject(Some(file_name), MISSING_EMAIL));
        };

        let id = JobId::new();
        let object = object_name(id, file_name);

        if let Err(e) = self.store(&object, data).await {
            tracing::error!(job_id = %id, file = %file_name, error = %e, "Upload could not be stored");
            self.events.broadcast(EventPayload::JobRejected {
                file_name: Some(file_name.to_string()),
                reason: e.to_string(),
            });
            return Err(e);
        }

        let classification = self.classifier.classify(file_name);
        let job = Job {
            id,
            file_name: file_name.to_string(),
            email: email.to_string(),
            object,
            expected: classification.branches,
            created_at: Utc::now(),
        };

        tracing::info!(
            job_id = %job.id,
            file = %job.file_name,
            route = %classification.route,
            branches = %job.expected,
            "Job accepted"
        );
        self.events.broadcast(EventPayload::JobAccepted {
            job_id: job.id,
            file_name: job.file_name.clone(),
            route: classification.route,
            expected: job.expected.clone(),
        });

        // Registered before publishing, so the deadline covers the job even
        // if no branch request or completion ever gets through.
        self.barrier.register(&job);
        let report = self.dispatcher.dispatch(&job, classification.route).await;
        if !report.is_complete() {
            tracing::warn!(
                job_id = %job.id,
                published = report.published.len(),
                failed = report.failed.len(),
                "Fan-out incomplete; join will resolve by timeout"
            );
        }

        Ok(Accepted {
            job,
            route: classification.route,
            report,
        })
    }

    async fn store(&self, object: &str, data: Bytes) -> Result<()> {
        self.container_ready
            .get_or_try_init(|| self.blobs.ensure_container(&self.container))
            .await?;
        self.blobs.put(&self.container, object, data).await
    }

    fn reject(&self, file_name: Option<&str>, reason: &str) -> Error {
        tracing::warn!(file = ?file_name, "{reason}");
        self.events.broadcast(EventPayload::JobRejected {
            file_name: file_name.map(String::from),
            reason: reason.to_string(),
        });
        Error::Validation(reason.to_string())
    }

    /// Branch set a file name would be routed to, without submitting it.
    pub fn preview(&self, file_name: &str) -> (Route, BranchSet) {
        let c = self.classifier.classify(file_name);
        (c.route, c.branches)
    }
}
