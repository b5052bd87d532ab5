//! # Partitioning
//!
//! Keys map to partitions with murmur3, so every process agrees on which
//! partition (and therefore which owner) holds a session's state.

use std::collections::BTreeSet;
use std::io::Cursor;

/// Index of a partition within a topic.
pub type PartitionId = u32;

/// Partition holding `key` among `partition_count` partitions.
#[must_use]
pub fn partition_for(key: &str, partition_count: u32) -> PartitionId {
    if partition_count <= 1 {
        return 0;
    }
    // Reading from an in-memory cursor cannot fail.
    let hash = murmur3::murmur3_32(&mut Cursor::new(key.as_bytes()), 0).unwrap_or(0);
    hash % partition_count
}

/// Partitions currently owned by this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionAssignment {
    partition_count: u32,
    owned: BTreeSet<PartitionId>,
}

impl PartitionAssignment {
    pub fn new(partition_count: u32) -> Self {
        Self {
            partition_count,
            owned: BTreeSet::new(),
        }
    }

    /// Take ownership of `partitions`. Returns the ones that were newly assigned.
    pub fn assign(&mut self, partitions: &[PartitionId]) -> Vec<PartitionId> {
        partitions
            .iter()
            .copied()
            .filter(|p| *p < self.partition_count && self.owned.insert(*p))
            .collect()
    }

    /// Drop ownership of `partitions`. Returns the ones that were actually owned.
    pub fn revoke(&mut self, partitions: &[PartitionId]) -> Vec<PartitionId> {
        partitions
            .iter()
            .copied()
            .filter(|p| self.owned.remove(p))
            .collect()
    }

    #[must_use]
    pub fn owns_partition(&self, partition: PartitionId) -> bool {
        self.owned.contains(&partition)
    }

    /// Whether the partition holding `key` is owned here.
    #[must_use]
    pub fn owns_key(&self, key: &str) -> bool {
        self.owns_partition(partition_for(key, self.partition_count))
    }

    #[must_use]
    pub fn owned(&self) -> &BTreeSet<PartitionId> {
        &self.owned
    }

    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }
}
