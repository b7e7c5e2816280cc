//! Wiring: opens every channel, builds the stages and spawns their
//! consumers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tf_blob::BlobStore;
use tf_channel::{ChannelTransport, StartPosition};
use tf_core::config::Config;
use tf_core::events::EventBus;
use tf_core::{Branch, Result, NOTIFY_CHANNEL};
use tf_transform::{RecipeOptions, TransformEngine};

use crate::classify::Classifier;
use crate::consumer::{run_consumer, MessageHandler, RetryPolicy};
use crate::dispatch::Dispatcher;
use crate::join::JoinBarrier;
use crate::mail::Mailer;
use crate::readiness::Readiness;
use crate::stages::{run_sweeper, BranchWorker, JoinHandler, Notifier};
use crate::submit::Submitter;

/// Consumer group of the join stage.
pub const JOIN_GROUP: &str = "join";
/// Consumer group of the notification emitter.
pub const NOTIFY_GROUP: &str = "notify";

/// Every channel the pipeline publishes to or consumes from.
pub fn channel_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Branch::ALL
        .iter()
        .flat_map(|b| [b.input_channel(), b.completion_channel()])
        .collect();
    names.push(NOTIFY_CHANNEL);
    names
}

/// External collaborators the pipeline is built over.
#[derive(Clone)]
pub struct PipelineDeps {
    pub transport: Arc<dyn ChannelTransport>,
    pub blobs: Arc<dyn BlobStore>,
    pub engine: Arc<dyn TransformEngine>,
    pub mailer: Arc<dyn Mailer>,
}

/// The assembled pipeline.
pub struct Pipeline {
    config: Arc<Config>,
    deps: PipelineDeps,
    events: Arc<EventBus>,
    readiness: Arc<Readiness>,
    barrier: Arc<JoinBarrier>,
    submitter: Arc<Submitter>,
}

impl Pipeline {
    pub async fn build(
        config: Arc<Config>,
        deps: PipelineDeps,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        for name in channel_names() {
            deps.transport.open(name).await?;
        }

        let classifier = Classifier::from_config(&config.routing)?;
        let dispatcher = Dispatcher::connect(deps.transport.as_ref(), events.clone()).await?;
        let barrier = Arc::new(JoinBarrier::new(
            config.join.timeout(),
            config.join.tombstone_ttl(),
        ));
        let submitter = Arc::new(Submitter::new(
            deps.blobs.clone(),
            config.storage.container.clone(),
            classifier,
            dispatcher,
            barrier.clone(),
            events.clone(),
        ));

        Ok(Self {
            config,
            deps,
            events,
            readiness: Arc::new(Readiness::new()),
            barrier,
            submitter,
        })
    }

    pub fn submitter(&self) -> Arc<Submitter> {
        self.submitter.clone()
    }

    pub fn barrier(&self) -> Arc<JoinBarrier> {
        self.barrier.clone()
    }

    pub fn readiness(&self) -> Arc<Readiness> {
        self.readiness.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn transport(&self) -> Arc<dyn ChannelTransport> {
        self.deps.transport.clone()
    }

    /// Start the engine warm-up, every consumer and the join sweeper.
    ///
    /// All tasks stop when `cancel` fires. Consumers resume from their
    /// group's committed offset, so anything received but not yet committed
    /// is redelivered on the next start.
    pub async fn spawn(&self, cancel: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();
        let policy = RetryPolicy::from_config(&self.config.consumer);
        let transport = self.deps.transport.as_ref();

        handles.push(self.spawn_warmup());

        let recipe = RecipeOptions {
            width: self.config.transform.width,
            frame_offset: self.config.transform.frame_offset.clone(),
        };
        for branch in Branch::ALL {
            let completions = transport.create_producer(branch.completion_channel()).await?;
            let worker: Arc<dyn MessageHandler> = Arc::new(BranchWorker::new(
                branch,
                self.deps.blobs.clone(),
                self.config.storage.container.clone(),
                self.deps.engine.clone(),
                recipe.clone(),
                completions,
                self.readiness.clone(),
                self.events.clone(),
            ));
            let group = format!("{branch}-worker");
            handles.extend(
                self.spawn_consumers(branch.input_channel(), &group, worker, policy, &cancel)
                    .await?,
            );
        }

        let notify = transport.create_producer(NOTIFY_CHANNEL).await?;
        let join: Arc<dyn MessageHandler> = Arc::new(JoinHandler::new(
            self.barrier.clone(),
            notify.clone(),
            policy,
            self.events.clone(),
        ));
        for branch in Branch::ALL {
            handles.extend(
                self.spawn_consumers(
                    branch.completion_channel(),
                    JOIN_GROUP,
                    join.clone(),
                    policy,
                    &cancel,
                )
                .await?,
            );
        }

        let notifier: Arc<dyn MessageHandler> = Arc::new(Notifier::new(
            self.deps.mailer.clone(),
            self.config.mail.from.clone(),
            self.events.clone(),
        ));
        handles.extend(
            self.spawn_consumers(NOTIFY_CHANNEL, NOTIFY_GROUP, notifier, policy, &cancel)
                .await?,
        );

        handles.push(tokio::spawn(run_sweeper(
            self.barrier.clone(),
            notify,
            policy,
            self.events.clone(),
            self.config.join.sweep_interval(),
            cancel.child_token(),
        )));

        tracing::info!(
            tasks = handles.len(),
            engine = self.deps.engine.name(),
            mailer = self.deps.mailer.name(),
            "Pipeline started"
        );
        Ok(handles)
    }

    fn spawn_warmup(&self) -> JoinHandle<()> {
        let engine = self.deps.engine.clone();
        let readiness = self.readiness.clone();
        tokio::spawn(async move {
            match engine.prepare().await {
                Ok(()) => {
                    readiness.mark_engine_ready();
                    tracing::info!(engine = engine.name(), "Transform engine ready");
                }
                Err(e) => {
                    tracing::error!(
                        engine = engine.name(),
                        error = %e,
                        "Transform engine failed to initialize; staying not ready"
                    );
                }
            }
        })
    }

    async fn spawn_consumers(
        &self,
        channel: &str,
        group: &str,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        let transport = self.deps.transport.as_ref();
        let mut handles = Vec::new();
        for partition in transport.list_partitions(channel).await? {
            let consumer = transport
                .create_consumer(channel, group, partition, StartPosition::Committed)
                .await?;
            handles.push(tokio::spawn(run_consumer(
                consumer,
                handler.clone(),
                policy,
                cancel.child_token(),
            )));
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_channel_is_distinct() {
        let names = channel_names();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(names.len(), 7);
        assert_eq!(unique.len(), names.len());
        assert!(names.contains(&"notifyevent"));
        assert!(names.contains(&"animatedgifreadyevent"));
    }
}
