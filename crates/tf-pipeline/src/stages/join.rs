//! Join stage: feeds completions into the barrier and publishes the job's
//! notification when it fires or expires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tf_channel::{decode, publish_json, ChannelProducer, Envelope};
use tf_core::events::{EventBus, EventPayload};
use tf_core::{BranchCompletion, NotifyEvent, Result};

use crate::consumer::{MessageHandler, RetryPolicy};
use crate::join::{JoinBarrier, JoinDecision};

/// Consumes the branch completion channels.
pub struct JoinHandler {
    barrier: Arc<JoinBarrier>,
    notify: Arc<dyn ChannelProducer>,
    retry: RetryPolicy,
    events: Arc<EventBus>,
}

impl JoinHandler {
    pub fn new(
        barrier: Arc<JoinBarrier>,
        notify: Arc<dyn ChannelProducer>,
        retry: RetryPolicy,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            barrier,
            notify,
            retry,
            events,
        }
    }
}

/// Publish a terminal event, retrying in place.
///
/// The barrier has already retired the job by the time this runs, so a
/// redelivered completion would be dropped as late. Retrying here is the
/// only chance to get the notification out.
async fn publish_notification(
    notify: &dyn ChannelProducer,
    event: &NotifyEvent,
    retry: &RetryPolicy,
) -> Result<()> {
    let key = event.job_id.to_string();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match publish_json(notify, &key, event).await {
            Ok(_) => return Ok(()),
            Err(e) if attempt >= retry.max_attempts => return Err(e),
            Err(e) => {
                tracing::warn!(job_id = %event.job_id, attempt, error = %e, "Notify publish failed, retrying");
                tokio::time::sleep(retry.backoff(attempt)).await;
            }
        }
    }
}

#[async_trait]
impl MessageHandler for JoinHandler {
    fn name(&self) -> &'static str {
        "join"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let completion: BranchCompletion = decode(envelope)?;
        let job_id = completion.job_id;

        match self.barrier.observe(&completion) {
            JoinDecision::Pending { received, expected } => {
                tracing::debug!(job_id = %job_id, branch = %completion.branch, received, expected, "Join pending");
            }
            JoinDecision::Duplicate => {
                tracing::debug!(job_id = %job_id, branch = %completion.branch, "Duplicate completion ignored");
            }
            JoinDecision::Late => {
                tracing::debug!(job_id = %job_id, branch = %completion.branch, "Completion for retired job ignored");
            }
            JoinDecision::Rejected(reason) => {
                tracing::warn!(job_id = %job_id, branch = %completion.branch, %reason, "Completion rejected");
            }
            JoinDecision::Fired(event) => {
                let failed_branches = event.failures.len();
                tracing::info!(job_id = %job_id, file = %event.file_name, failed_branches, "Join fired");
                if let Err(e) = publish_notification(self.notify.as_ref(), &event, &self.retry).await
                {
                    tracing::error!(job_id = %job_id, error = %e, "Join fired but notification was lost");
                    return Ok(());
                }
                self.events.broadcast(EventPayload::JoinFired {
                    job_id,
                    failed_branches,
                });
            }
        }
        Ok(())
    }
}

/// Periodically expire stalled joins and prune old tombstones.
pub async fn run_sweeper(
    barrier: Arc<JoinBarrier>,
    notify: Arc<dyn ChannelProducer>,
    retry: RetryPolicy,
    events: Arc<EventBus>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(interval_secs = interval.as_secs(), "Join sweeper started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }

        for expired in barrier.expire_stale() {
            let job_id = expired.event.job_id;
            tracing::warn!(
                job_id = %job_id,
                file = %expired.event.file_name,
                missing = ?expired.missing,
                "Join timed out"
            );
            events.broadcast(EventPayload::JoinExpired {
                job_id,
                missing: expired.missing,
            });
            if let Err(e) = publish_notification(notify.as_ref(), &expired.event, &retry).await {
                tracing::error!(job_id = %job_id, error = %e, "Timeout notification was lost");
            }
        }

        let pruned = barrier.prune_tombstones();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned join tombstones");
        }
    }
    tracing::debug!("Join sweeper stopped");
}
