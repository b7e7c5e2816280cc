//! Key-to-partition routing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::transport::PartitionId;

/// Map a partition key onto one of `partitions` partitions.
///
/// Stable for the lifetime of the process, which is as long as the
/// in-memory logs live.
pub fn partition_for(key: &str, partitions: u32) -> PartitionId {
    if partitions <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partitions)) as PartitionId
}
