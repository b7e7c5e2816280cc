//! # tf-channel
//!
//! Named, partitioned, append-only publish/subscribe channels with
//! independent consumer cursors. Every pipeline stage talks to every other
//! stage through this crate and nothing else.
//!
//! This crate provides:
//!
//! - **[`ChannelTransport`]** -- open channels, list partitions, and create
//!   producers and per-partition consumers.
//! - **[`ChannelProducer`]** / **[`ChannelConsumer`]** -- keyed publish and
//!   cursor-based receive with explicit commit (at-least-once).
//! - **[`MemoryTransport`]** -- an in-process implementation backed by
//!   per-partition logs.
//! - **[`codec`]** -- JSON helpers for typed payloads.

pub mod codec;
pub mod memory;
pub mod partition;
pub mod transport;

pub use codec::{decode, publish_json};
pub use memory::MemoryTransport;
pub use partition::partition_for;
pub use transport::{
    ChannelConsumer, ChannelProducer, ChannelTransport, Delivery, Envelope, PartitionId,
    StartPosition,
};
