//! In-process channel transport.
//!
//! Each channel is a fixed number of partitions; each partition is an
//! append-only `Vec<Envelope>` plus a [`Notify`] that wakes waiting
//! consumers. Committed offsets are kept per `(group, partition)`.
//! Nothing survives the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Notify;

use tf_core::{Error, MessageId, Result};

use crate::partition::partition_for;
use crate::transport::{
    ChannelConsumer, ChannelProducer, ChannelTransport, Delivery, Envelope, PartitionId,
    StartPosition,
};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PartitionLog {
    entries: RwLock<Vec<Envelope>>,
    appended: Notify,
}

impl PartitionLog {
    fn get(&self, offset: u64) -> Option<Envelope> {
        self.entries.read().get(offset as usize).cloned()
    }

    fn len(&self) -> u64 {
        self.entries.read().len() as u64
    }
}

struct MemoryChannel {
    name: Arc<str>,
    logs: Vec<Arc<PartitionLog>>,
    committed: DashMap<(String, PartitionId), u64>,
    unavailable: AtomicBool,
}

impl MemoryChannel {
    fn new(name: &str, partitions: u32) -> Self {
        Self {
            name: Arc::from(name),
            logs: (0..partitions.max(1))
                .map(|_| Arc::new(PartitionLog::default()))
                .collect(),
            committed: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    fn log(&self, partition: PartitionId) -> Result<&Arc<PartitionLog>> {
        self.logs.get(partition as usize).ok_or_else(|| {
            Error::channel(
                self.name.as_ref(),
                format!("partition {partition} does not exist"),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// In-memory [`ChannelTransport`].
pub struct MemoryTransport {
    partitions: u32,
    channels: DashMap<String, Arc<MemoryChannel>>,
}

impl MemoryTransport {
    /// Create a transport whose channels each have `partitions` partitions.
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            channels: DashMap::new(),
        }
    }

    fn channel(&self, name: &str) -> Result<Arc<MemoryChannel>> {
        self.channels
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::channel(name, "channel has not been opened"))
    }

    /// Every message currently stored in `channel`, partition by partition.
    pub fn messages(&self, channel: &str) -> Vec<Envelope> {
        let Ok(ch) = self.channel(channel) else {
            return Vec::new();
        };
        ch.logs
            .iter()
            .flat_map(|log| log.entries.read().clone())
            .collect()
    }

    /// Number of messages stored in `channel` across partitions.
    pub fn depth(&self, channel: &str) -> u64 {
        self.channel(channel)
            .map(|ch| ch.logs.iter().map(|l| l.len()).sum())
            .unwrap_or(0)
    }

    /// Last committed offset for a consumer group on one partition.
    pub fn committed(&self, channel: &str, group: &str, partition: PartitionId) -> Option<u64> {
        let ch = self.channel(channel).ok()?;
        let offset = ch.committed.get(&(group.to_string(), partition)).map(|o| *o);
        offset
    }

    /// Make every send on `channel` fail until switched back.
    pub fn set_unavailable(&self, channel: &str, unavailable: bool) {
        if let Ok(ch) = self.channel(channel) {
            ch.unavailable.store(unavailable, Ordering::SeqCst);
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn open(&self, channel: &str) -> Result<()> {
        let partitions = self.partitions;
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| {
                tracing::debug!(channel = %channel, partitions, "Opened channel");
                Arc::new(MemoryChannel::new(channel, partitions))
            });
        Ok(())
    }

    async fn list_partitions(&self, channel: &str) -> Result<Vec<PartitionId>> {
        let ch = self.channel(channel)?;
        Ok((0..ch.logs.len() as PartitionId).collect())
    }

    async fn create_consumer(
        &self,
        channel: &str,
        group: &str,
        partition: PartitionId,
        start: StartPosition,
    ) -> Result<Box<dyn ChannelConsumer>> {
        let ch = self.channel(channel)?;
        let log = Arc::clone(ch.log(partition)?);

        let next = match start {
            StartPosition::Earliest => 0,
            StartPosition::Latest => log.len(),
            StartPosition::Committed => ch
                .committed
                .get(&(group.to_string(), partition))
                .map(|o| *o)
                .unwrap_or(0),
            StartPosition::Offset(offset) => offset,
        };

        Ok(Box::new(MemoryConsumer {
            channel: ch,
            group: group.to_string(),
            partition,
            log,
            next,
        }))
    }

    async fn create_producer(&self, channel: &str) -> Result<Arc<dyn ChannelProducer>> {
        let ch = self.channel(channel)?;
        Ok(Arc::new(MemoryProducer { channel: ch }))
    }
}

// ---------------------------------------------------------------------------
// Producer / Consumer
// ---------------------------------------------------------------------------

struct MemoryProducer {
    channel: Arc<MemoryChannel>,
}

#[async_trait]
impl ChannelProducer for MemoryProducer {
    fn channel(&self) -> &str {
        &self.channel.name
    }

    async fn send(&self, partition_key: &str, payload: Bytes) -> Result<Delivery> {
        if self.channel.unavailable.load(Ordering::SeqCst) {
            return Err(Error::publish(
                self.channel.name.as_ref(),
                "channel unavailable",
            ));
        }

        let partition = partition_for(partition_key, self.channel.logs.len() as u32);
        let log = self.channel.log(partition)?;

        let offset = {
            let mut entries = log.entries.write();
            let offset = entries.len() as u64;
            entries.push(Envelope {
                id: MessageId::new(),
                channel: Arc::clone(&self.channel.name),
                partition,
                offset,
                key: partition_key.to_string(),
                payload,
                published_at: Utc::now(),
            });
            offset
        };
        log.appended.notify_waiters();

        Ok(Delivery { partition, offset })
    }
}

struct MemoryConsumer {
    channel: Arc<MemoryChannel>,
    group: String,
    partition: PartitionId,
    log: Arc<PartitionLog>,
    next: u64,
}

#[async_trait]
impl ChannelConsumer for MemoryConsumer {
    fn channel(&self) -> &str {
        &self.channel.name
    }

    fn partition(&self) -> PartitionId {
        self.partition
    }

    fn position(&self) -> u64 {
        self.next
    }

    async fn recv(&mut self) -> Result<Envelope> {
        loop {
            // Register interest before checking the log so an append between
            // the check and the await still wakes us.
            let notified = self.log.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(envelope) = self.log.get(self.next) {
                self.next += 1;
                return Ok(envelope);
            }

            notified.await;
        }
    }

    async fn commit(&mut self, next_offset: u64) -> Result<()> {
        let len = self.log.len();
        if next_offset > len {
            return Err(Error::channel(
                self.channel.name.as_ref(),
                format!("commit offset {next_offset} beyond end of partition ({len})"),
            ));
        }

        let mut entry = self
            .channel
            .committed
            .entry((self.group.clone(), self.partition))
            .or_insert(0);
        if next_offset > *entry {
            *entry = next_offset;
        }
        Ok(())
    }
}
