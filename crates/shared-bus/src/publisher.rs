//! # Record Publisher
//!
//! Defines the publishing side of the partitioned log.

use crate::error::{BusError, BusResult};
use crate::partition::{partition_for, PartitionId};
use crate::subscriber::{RecordFilter, RecordStream, Subscription};
use crate::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PARTITION_COUNT};
use async_trait::async_trait;
use shared_types::{Record, Topic};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing records to the log.
///
/// Callers await the returned offset before committing the consumption of
/// the event that produced the record (at-least-once processing).
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Append one record.
    ///
    /// # Returns
    ///
    /// The offset assigned to the record.
    async fn publish(&self, record: Record) -> BusResult<u64>;

    /// Append records in order. Stops at the first failure.
    async fn publish_all(&self, records: Vec<Record>) -> BusResult<Vec<u64>> {
        let mut offsets = Vec::with_capacity(records.len());
        for record in records {
            offsets.push(self.publish(record).await?);
        }
        Ok(offsets)
    }
}

/// A record together with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRecord {
    pub offset: u64,
    pub partition: PartitionId,
    pub record: Record,
}

/// In-memory implementation of the partitioned log.
///
/// Retains every record (like an uncompacted topic) and fans out to live
/// subscribers via `tokio::sync::broadcast`. Suitable for single-node
/// operation and tests; distributed deployments use a Kafka client.
pub struct InMemoryLog {
    /// Broadcast sender for live subscribers.
    sender: broadcast::Sender<LoggedRecord>,

    /// Retained records in offset order.
    retained: RwLock<Vec<LoggedRecord>>,

    /// Next offset to assign.
    next_offset: AtomicU64,

    /// Partitions per topic.
    partition_count: u32,

    /// Cleared to simulate a broker outage.
    available: AtomicBool,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryLog {
    /// Create a new in-memory log with default capacity and partitioning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CHANNEL_CAPACITY, DEFAULT_PARTITION_COUNT)
    }

    /// Create a new in-memory log with the given capacity and partition count.
    #[must_use]
    pub fn with_config(capacity: usize, partition_count: u32) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            retained: RwLock::new(Vec::new()),
            next_offset: AtomicU64::new(0),
            partition_count: partition_count.max(1),
            available: AtomicBool::new(true),
            capacity,
        }
    }

    /// Subscribe to records matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: RecordFilter) -> Subscription {
        debug!(topics = ?filter.topics, "New subscription created");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Get a stream of records matching a filter.
    #[must_use]
    pub fn record_stream(&self, filter: RecordFilter) -> RecordStream {
        RecordStream::new(self.subscribe(filter))
    }

    /// Every retained record on `topic`, in offset order.
    #[must_use]
    pub fn records(&self, topic: Topic) -> Vec<Record> {
        self.retained
            .read()
            .map(|log| {
                log.iter()
                    .filter(|r| r.record.topic == topic)
                    .map(|r| r.record.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Retained records on `topic` for one key.
    #[must_use]
    pub fn records_for_key(&self, topic: Topic, key: &str) -> Vec<Record> {
        self.records(topic)
            .into_iter()
            .filter(|r| r.key == key)
            .collect()
    }

    /// Total number of records appended.
    #[must_use]
    pub fn records_published(&self) -> u64 {
        self.next_offset.load(Ordering::SeqCst)
    }

    /// Simulate a broker outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordPublisher for InMemoryLog {
    async fn publish(&self, record: Record) -> BusResult<u64> {
        if !self.available.load(Ordering::SeqCst) {
            warn!(topic = %record.topic, key = %record.key, "Publish rejected, log unavailable");
            return Err(BusError::Unavailable {
                component: "log",
                reason: "broker unreachable".to_string(),
            });
        }

        let partition = partition_for(&record.key, self.partition_count);
        let logged = {
            let mut retained = self.retained.write().map_err(|_| BusError::Closed)?;
            let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
            let logged = LoggedRecord {
                offset,
                partition,
                record,
            };
            retained.push(logged.clone());
            logged
        };

        let offset = logged.offset;
        match self.sender.send(logged) {
            Ok(receivers) => {
                debug!(offset, partition, receivers, "Record published");
            }
            Err(_) => {
                // Retained regardless; live fan-out simply had no listeners.
                debug!(offset, partition, "Record published (no live subscribers)");
            }
        }
        Ok(offset)
    }
}
