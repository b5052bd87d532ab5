//! # Record Subscriber
//!
//! Defines the subscription side of the partitioned log.

use crate::partition::PartitionId;
use crate::publisher::LoggedRecord;
use shared_types::Topic;
use std::collections::BTreeSet;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The log was closed.
    #[error("Log closed")]
    Closed,
}

/// Which records a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Topics to receive. Empty means every topic.
    pub topics: Vec<Topic>,
    /// Partitions to receive. `None` means every partition.
    pub partitions: Option<BTreeSet<PartitionId>>,
}

impl RecordFilter {
    /// Receive everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Receive only the given topics.
    #[must_use]
    pub fn topics(topics: Vec<Topic>) -> Self {
        Self {
            topics,
            partitions: None,
        }
    }

    /// Restrict to the given partitions.
    #[must_use]
    pub fn with_partitions(mut self, partitions: impl IntoIterator<Item = PartitionId>) -> Self {
        self.partitions = Some(partitions.into_iter().collect());
        self
    }

    /// Whether `logged` passes this filter.
    #[must_use]
    pub fn matches(&self, logged: &LoggedRecord) -> bool {
        let topic_ok = self.topics.is_empty() || self.topics.contains(&logged.record.topic);
        let partition_ok = self
            .partitions
            .as_ref()
            .map_or(true, |p| p.contains(&logged.partition));
        topic_ok && partition_ok
    }
}

/// A subscription handle for receiving records.
pub struct Subscription {
    receiver: broadcast::Receiver<LoggedRecord>,
    filter: RecordFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<LoggedRecord>, filter: RecordFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next record that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(record)` - The next matching record
    /// - `None` - The log was dropped
    pub async fn recv(&mut self) -> Option<LoggedRecord> {
        loop {
            let logged = match self.receiver.recv().await {
                Ok(r) => r,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some records skipped");
                    continue;
                }
            };

            if self.filter.matches(&logged) {
                return Some(logged);
            }
        }
    }

    /// Try to receive the next record without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` - A record was available and matched
    /// - `Ok(None)` - No record available (would block)
    /// - `Err(SubscriptionError::Closed)` - The log was dropped
    pub fn try_recv(&mut self) -> Result<Option<LoggedRecord>, SubscriptionError> {
        loop {
            let logged = match self.receiver.try_recv() {
                Ok(r) => r,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&logged) {
                return Ok(Some(logged));
            }
        }
    }

    /// Drain every record currently buffered for this subscription.
    pub fn drain(&mut self) -> Vec<LoggedRecord> {
        let mut records = Vec::new();
        while let Ok(Some(logged)) = self.try_recv() {
            records.push(logged);
        }
        records
    }

    #[must_use]
    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }
}

/// A stream wrapper for subscriptions.
pub struct RecordStream {
    subscription: Subscription,
}

impl RecordStream {
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    #[must_use]
    pub fn filter(&self) -> &RecordFilter {
        self.subscription.filter()
    }
}

impl Stream for RecordStream {
    type Item = LoggedRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.subscription.try_recv() {
            Ok(Some(logged)) => Poll::Ready(Some(logged)),
            Ok(None) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(SubscriptionError::Closed) => Poll::Ready(None),
        }
    }
}
