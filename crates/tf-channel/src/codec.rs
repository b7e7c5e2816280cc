//! JSON payload helpers.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use tf_core::Result;

use crate::transport::{ChannelProducer, Delivery, Envelope};

/// Serialize `value` as JSON and publish it under `partition_key`.
pub async fn publish_json<T: Serialize + Sync>(
    producer: &dyn ChannelProducer,
    partition_key: &str,
    value: &T,
) -> Result<Delivery> {
    let payload = Bytes::from(serde_json::to_vec(value)?);
    producer.send(partition_key, payload).await
}

/// Deserialize an envelope's JSON payload.
pub fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T> {
    Ok(serde_json::from_slice(&envelope.payload)?)
}
