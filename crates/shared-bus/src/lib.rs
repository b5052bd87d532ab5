//! # Shared Bus - Partitioned Log Contract
//!
//! The session layer rides on a Kafka-like log: at-least-once, partitioned,
//! possibly reordering. This crate is the narrow contract the session manager
//! and flow mapper consume, plus an in-memory implementation for single-node
//! operation and tests.
//!
//! ```text
//! ┌──────────────┐  publish()   ┌──────────────┐  subscribe()  ┌──────────────┐
//! │ Flow Mapper  │ ───────────→ │ InMemoryLog  │ ────────────→ │   Consumer   │
//! └──────────────┘              │ (partitions) │               └──────────────┘
//!        ↑                      └──────────────┘                      │
//!        └──────── on_partition_lost / synced / post_commit ──────────┘
//! ```
//!
//! ## Ownership
//!
//! - Keyed state lives in a `KeyedStateStore`, one owner per partition.
//! - The partition assignment protocol is the source of truth for ownership.
//!   Process-local bookkeeping (timers) is reconciled through
//!   [`RebalanceListener`], never the other way round.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod error;
pub mod partition;
pub mod publisher;
pub mod rebalance;
pub mod store;
pub mod subscriber;

// Re-export main types
pub use error::{BusError, BusResult};
pub use partition::{partition_for, PartitionAssignment, PartitionId};
pub use publisher::{InMemoryLog, LoggedRecord, RecordPublisher};
pub use rebalance::RebalanceListener;
pub use store::{InMemoryStateStore, KeyedStateStore};
pub use subscriber::{RecordFilter, RecordStream, Subscription, SubscriptionError};

/// Maximum records to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Partition count used when none is configured.
pub const DEFAULT_PARTITION_COUNT: u32 = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }

    #[test]
    fn test_default_partitions() {
        assert!(DEFAULT_PARTITION_COUNT > 0);
    }
}
