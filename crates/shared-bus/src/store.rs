//! # Keyed State Store
//!
//! The compacted-topic state abstraction: one record per key, owned by the
//! consumer assigned that key's partition. Read-modify-write happens on the
//! owner only, so no cross-process locking is needed here.
//!
//! The persisted layout is opaque: states are stored `bincode`-encoded and
//! a deletion leaves a tombstone behind.

use crate::error::{BusError, BusResult};
use crate::partition::{partition_for, PartitionId};
use crate::DEFAULT_PARTITION_COUNT;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::StateLookup;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::debug;

/// Keyed state storage used by the session manager and the flow mapper.
#[async_trait]
pub trait KeyedStateStore<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Read the record for `key`.
    async fn get(&self, key: &str) -> BusResult<StateLookup<S>>;

    /// Write the record for `key`.
    async fn put(&self, key: &str, state: &S) -> BusResult<()>;

    /// Delete the record for `key`, leaving a tombstone.
    async fn delete(&self, key: &str) -> BusResult<()>;
}

/// In-memory keyed store with tombstones.
pub struct InMemoryStateStore<S> {
    /// `None` marks a tombstone.
    entries: RwLock<HashMap<String, Option<Vec<u8>>>>,
    partition_count: u32,
    available: AtomicBool,
    _state: PhantomData<fn() -> S>,
}

impl<S> InMemoryStateStore<S>
where
    S: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITION_COUNT)
    }

    #[must_use]
    pub fn with_partitions(partition_count: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            partition_count: partition_count.max(1),
            available: AtomicBool::new(true),
            _state: PhantomData,
        }
    }

    /// Simulate a store outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Live states whose keys fall in `partitions`.
    ///
    /// This is the snapshot a partition-assignment callback carries.
    pub fn snapshot_partitions(&self, partitions: &[PartitionId]) -> BusResult<HashMap<String, S>> {
        let entries = self.read_entries()?;
        let mut snapshot = HashMap::new();
        for (key, bytes) in entries.iter() {
            let Some(bytes) = bytes else { continue };
            if partitions.contains(&partition_for(key, self.partition_count)) {
                snapshot.insert(key.clone(), decode(key, bytes)?);
            }
        }
        Ok(snapshot)
    }

    /// Every live state.
    pub fn snapshot(&self) -> BusResult<HashMap<String, S>> {
        let all: Vec<PartitionId> = (0..self.partition_count).collect();
        self.snapshot_partitions(&all)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.values().filter(|v| v.is_some()).count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> BusResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Unavailable {
                component: "state store",
                reason: "store unreachable".to_string(),
            })
        }
    }

    fn read_entries(
        &self,
    ) -> BusResult<std::sync::RwLockReadGuard<'_, HashMap<String, Option<Vec<u8>>>>> {
        self.entries.read().map_err(|_| BusError::Closed)
    }
}

impl<S> Default for InMemoryStateStore<S>
where
    S: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

fn decode<S: DeserializeOwned>(key: &str, bytes: &[u8]) -> BusResult<S> {
    bincode::deserialize(bytes).map_err(|e| BusError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl<S> KeyedStateStore<S> for InMemoryStateStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> BusResult<StateLookup<S>> {
        self.check_available()?;
        let entries = self.read_entries()?;
        match entries.get(key) {
            None => Ok(StateLookup::Unknown),
            Some(None) => Ok(StateLookup::Tombstoned),
            Some(Some(bytes)) => Ok(StateLookup::Known(decode(key, bytes)?)),
        }
    }

    async fn put(&self, key: &str, state: &S) -> BusResult<()> {
        self.check_available()?;
        let bytes = bincode::serialize(state).map_err(|e| BusError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let mut entries = self.entries.write().map_err(|_| BusError::Closed)?;
        entries.insert(key.to_string(), Some(bytes));
        Ok(())
    }

    async fn delete(&self, key: &str) -> BusResult<()> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| BusError::Closed)?;
        entries.insert(key.to_string(), None);
        debug!(key, "State tombstoned");
        Ok(())
    }
}
