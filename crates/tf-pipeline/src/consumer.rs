//! Per-partition consumer loop.
//!
//! Receives envelopes from one channel partition, hands each to a
//! [`MessageHandler`], and commits the cursor only once the handler is done
//! with the message. Failed handlers are retried with exponential backoff;
//! after `max_attempts` the message is committed past and logged so one
//! poison message cannot wedge its partition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tf_channel::{ChannelConsumer, Envelope};
use tf_core::config::ConsumerConfig;
use tf_core::Result;

/// Longest pause between two attempts at the same message.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Processes messages from a channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Handle one envelope. Returning `Err` makes the loop retry it.
    async fn handle(&self, envelope: &Envelope) -> Result<()>;
}

/// How hard the loop tries before abandoning a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from the base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ConsumerConfig::default())
    }
}

/// How a message left the loop.
enum Disposition {
    Handled,
    Abandoned,
    Cancelled,
}

/// Drive `consumer` until `cancel` fires.
pub async fn run_consumer(
    mut consumer: Box<dyn ChannelConsumer>,
    handler: Arc<dyn MessageHandler>,
    policy: RetryPolicy,
    cancel: CancellationToken,
) {
    let channel = consumer.channel().to_string();
    let partition = consumer.partition();
    tracing::debug!(
        handler = handler.name(),
        channel = %channel,
        partition,
        position = consumer.position(),
        "Consumer started"
    );

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = consumer.recv() => r,
        };

        let envelope = match received {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(channel = %channel, partition, error = %e, "Receive failed");
                tokio::select! {
                    _ = tokio::time::sleep(policy.base_backoff.max(Duration::from_millis(50))) => continue,
                    _ = cancel.cancelled() => break,
                }
            }
        };

        match deliver(handler.as_ref(), &envelope, &policy, &cancel).await {
            Disposition::Cancelled => break,
            Disposition::Handled | Disposition::Abandoned => {}
        }

        if let Err(e) = consumer.commit(envelope.offset + 1).await {
            tracing::error!(
                channel = %channel,
                partition,
                offset = envelope.offset,
                error = %e,
                "Commit failed"
            );
        }
    }

    tracing::debug!(
        handler = handler.name(),
        channel = %channel,
        partition,
        "Consumer stopped"
    );
}

async fn deliver(
    handler: &dyn MessageHandler,
    envelope: &Envelope,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Disposition {
    let mut attempt = 0;
    loop {
        attempt += 1;
        tracing::debug!(
            handler = handler.name(),
            channel = %envelope.channel,
            partition = envelope.partition,
            offset = envelope.offset,
            attempt,
            "Handling message"
        );

        let result = tokio::select! {
            _ = cancel.cancelled() => return Disposition::Cancelled,
            r = handler.handle(envelope) => r,
        };

        let err = match result {
            Ok(()) => return Disposition::Handled,
            Err(e) => e,
        };

        if err.is_permanent() || attempt >= policy.max_attempts {
            tracing::error!(
                handler = handler.name(),
                channel = %envelope.channel,
                partition = envelope.partition,
                offset = envelope.offset,
                attempts = attempt,
                error = %err,
                "Abandoning message"
            );
            return Disposition::Abandoned;
        }

        let backoff = policy.backoff(attempt);
        tracing::warn!(
            handler = handler.name(),
            channel = %envelope.channel,
            offset = envelope.offset,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Handler failed, retrying"
        );
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => return Disposition::Cancelled,
        }
    }
}
