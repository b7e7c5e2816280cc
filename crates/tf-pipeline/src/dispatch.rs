//! Fan-out of a classified job onto the branch channels.
//!
//! A partially published fan-out is never rolled back. Branches that did
//! reach their channel run to completion and the join for the job is left to
//! the expiry sweep.

use std::collections::HashMap;
use std::sync::Arc;

use tf_channel::{publish_json, ChannelProducer, ChannelTransport};
use tf_core::events::{EventBus, EventPayload};
use tf_core::{Branch, Job, NotifyEvent, Result, Route, NOTIFY_CHANNEL};

/// A publish that did not reach its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFailure {
    pub channel: String,
    pub error: String,
}

/// What [`Dispatcher::dispatch`] managed to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Branches whose request reached the branch input channel.
    pub published: Vec<Branch>,
    /// Whether a short-circuit notification reached the notify channel.
    pub notified: bool,
    pub failed: Vec<PublishFailure>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Publishes branch requests and short-circuit notifications.
pub struct Dispatcher {
    branches: HashMap<Branch, Arc<dyn ChannelProducer>>,
    notify: Arc<dyn ChannelProducer>,
    events: Arc<EventBus>,
}

impl Dispatcher {
    /// Create producers for every branch input channel and the notify
    /// channel. The channels must already be open.
    pub async fn connect(transport: &dyn ChannelTransport, events: Arc<EventBus>) -> Result<Self> {
        let mut branches = HashMap::new();
        for branch in Branch::ALL {
            let producer = transport.create_producer(branch.input_channel()).await?;
            branches.insert(branch, producer);
        }
        let notify = transport.create_producer(NOTIFY_CHANNEL).await?;
        Ok(Self {
            branches,
            notify,
            events,
        })
    }

    /// Publish the events for `job`.
    ///
    /// Unsupported jobs get a single error notification and no branch
    /// requests. Everything else gets one request per expected branch, all
    /// keyed by the job id so they share a partition choice.
    pub async fn dispatch(&self, job: &Job, route: Route) -> DispatchReport {
        let key = job.id.to_string();
        let mut report = DispatchReport::default();

        if route == Route::Unsupported {
            let event = NotifyEvent::unsupported(job);
            match publish_json(self.notify.as_ref(), &key, &event).await {
                Ok(_) => report.notified = true,
                Err(e) => self.record_failure(job, NOTIFY_CHANNEL, e.to_string(), &mut report),
            }
            return report;
        }

        for branch in job.expected.iter() {
            let Some(producer) = self.branches.get(&branch) else {
                self.record_failure(
                    job,
                    branch.input_channel(),
                    "no producer for channel".to_string(),
                    &mut report,
                );
                continue;
            };
            let request = job.request_for(branch);
            match publish_json(producer.as_ref(), &key, &request).await {
                Ok(delivery) => {
                    tracing::debug!(
                        job_id = %job.id,
                        branch = %branch,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "Branch request published"
                    );
                    self.events
                        .broadcast(EventPayload::BranchDispatched { job_id: job.id, branch });
                    report.published.push(branch);
                }
                Err(e) => {
                    self.record_failure(job, branch.input_channel(), e.to_string(), &mut report)
                }
            }
        }
        report
    }

    fn record_failure(&self, job: &Job, channel: &str, error: String, report: &mut DispatchReport) {
        tracing::error!(job_id = %job.id, channel, error = %error, "Failed to publish");
        self.events.broadcast(EventPayload::DispatchFailed {
            job_id: job.id,
            channel: channel.to_string(),
            error: error.clone(),
        });
        report.failed.push(PublishFailure {
            channel: channel.to_string(),
            error,
        });
    }
}
