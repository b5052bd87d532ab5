//! Rebalance listener keeping the cleanup timers in line with partition ownership.

use super::task_state::ScheduledTaskState;
use crate::domain::FlowMapperState;
use async_trait::async_trait;
use shared_bus::{RebalanceListener, RecordPublisher};
use shared_types::TimeSource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Arms, fires and cancels cleanup timers on partition events.
pub struct CleanupRebalanceListener<P>
where
    P: RecordPublisher + 'static,
{
    tasks: Arc<ScheduledTaskState<P>>,
    clock: Arc<dyn TimeSource>,
}

impl<P> CleanupRebalanceListener<P>
where
    P: RecordPublisher + 'static,
{
    pub fn new(tasks: Arc<ScheduledTaskState<P>>, clock: Arc<dyn TimeSource>) -> Self {
        Self { tasks, clock }
    }

    pub fn tasks(&self) -> &Arc<ScheduledTaskState<P>> {
        &self.tasks
    }
}

#[async_trait]
impl<P> RebalanceListener<FlowMapperState> for CleanupRebalanceListener<P>
where
    P: RecordPublisher + 'static,
{
    async fn on_partition_lost(&self, states: &HashMap<String, FlowMapperState>) {
        let keys: Vec<&str> = states.keys().map(String::as_str).collect();
        self.tasks.cancel_all(&keys).await;
        info!(keys = keys.len(), "Cleanup timers cancelled for lost partitions");
    }

    async fn on_partition_synced(&self, states: &HashMap<String, FlowMapperState>) {
        let now = self.clock.now();
        for (key, state) in states {
            let Some(expiry) = state.cleanup_due() else {
                continue;
            };
            if expiry <= now {
                if let Err(e) = self.tasks.fire_now(key, expiry).await {
                    error!(key = %key, error = %e, "Failed to publish cleanup for expired session");
                }
            } else {
                self.tasks.schedule(key, expiry);
            }
        }
        debug!(states = states.len(), "Cleanup timers reconciled with synced partitions");
    }

    async fn on_post_commit(&self, updates: &HashMap<String, Option<FlowMapperState>>) {
        for (key, update) in updates {
            match update.as_ref().and_then(FlowMapperState::cleanup_due) {
                Some(expiry) => {
                    self.tasks.schedule(key, expiry);
                }
                None => {
                    self.tasks.cancel(key);
                }
            }
        }
    }
}
