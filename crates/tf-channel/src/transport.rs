//! Transport traits and the envelope type.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use tf_core::{MessageId, Result};

/// Index of a partition within a channel.
pub type PartitionId = u32;

/// Where a new consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// The first retained message.
    Earliest,
    /// Only messages appended after the consumer is created.
    Latest,
    /// The group's last committed offset, or the beginning if none.
    Committed,
    /// An explicit offset.
    Offset(u64),
}

/// A message as stored in a partition.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: MessageId,
    pub channel: Arc<str>,
    pub partition: PartitionId,
    /// Position within the partition; commit `offset + 1` to move past it.
    pub offset: u64,
    pub key: String,
    pub payload: Bytes,
    pub published_at: DateTime<Utc>,
}

/// Where a published message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: PartitionId,
    pub offset: u64,
}

/// Publishing half of a channel.
#[async_trait]
pub trait ChannelProducer: Send + Sync {
    fn channel(&self) -> &str;

    /// Append `payload` to the partition selected by `partition_key`.
    ///
    /// Messages sharing a key land on the same partition and keep their
    /// relative order.
    async fn send(&self, partition_key: &str, payload: Bytes) -> Result<Delivery>;
}

/// Reading half of a single channel partition.
///
/// The consumer keeps an in-memory read position that runs ahead of the
/// committed offset. A consumer recreated with [`StartPosition::Committed`]
/// resumes at the last commit, so anything read but not committed is
/// delivered again.
#[async_trait]
pub trait ChannelConsumer: Send {
    fn channel(&self) -> &str;

    fn partition(&self) -> PartitionId;

    /// Next offset this consumer will read.
    fn position(&self) -> u64;

    /// Wait for the next message. Cancel-safe: dropping the future loses
    /// nothing.
    async fn recv(&mut self) -> Result<Envelope>;

    /// Record that every message before `next_offset` has been handled.
    async fn commit(&mut self, next_offset: u64) -> Result<()>;
}

/// A channel backend.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open (creating if needed) the named channel.
    async fn open(&self, channel: &str) -> Result<()>;

    async fn list_partitions(&self, channel: &str) -> Result<Vec<PartitionId>>;

    /// Create a consumer for one partition on behalf of consumer `group`.
    ///
    /// Groups track committed offsets independently of each other.
    async fn create_consumer(
        &self,
        channel: &str,
        group: &str,
        partition: PartitionId,
        start: StartPosition,
    ) -> Result<Box<dyn ChannelConsumer>>;

    async fn create_producer(&self, channel: &str) -> Result<Arc<dyn ChannelProducer>>;
}
