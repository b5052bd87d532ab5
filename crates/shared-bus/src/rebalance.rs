//! # Rebalance Callbacks
//!
//! Ownership of keyed state moves between processes when partitions are
//! reassigned. Anything a process keeps alongside the store (timers, caches)
//! must be reconciled through these callbacks.

use async_trait::async_trait;
use std::collections::HashMap;

/// Callbacks fired by the partition assignment protocol.
///
/// Every snapshot maps the record key to its state. Implementations must
/// be idempotent: the same snapshot may be delivered more than once.
#[async_trait]
pub trait RebalanceListener<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Partitions holding `states` have been revoked from this process.
    ///
    /// Called before the next owner can act, so work for these keys must
    /// stop before this returns.
    async fn on_partition_lost(&self, states: &HashMap<String, S>);

    /// Partitions holding `states` are now owned and their state is loaded.
    async fn on_partition_synced(&self, states: &HashMap<String, S>);

    /// A batch of writes has been committed. `None` means the key was deleted.
    async fn on_post_commit(&self, updates: &HashMap<String, Option<S>>);
}
