//! Flow Mapper Service
//!
//! Consumes the flow mapper event topic. Each record is applied to the
//! stored mapper state, the state change is written, then the routed
//! records are published. Writing first makes a replayed Init reuse the
//! flow id chosen the first time.
//!
//! Once a batch is written, the committed states are handed to the cleanup
//! listener so CLOSING states get a timer and deleted or reopened ones lose it.

use crate::config::FlowMapperConfig;
use crate::domain::{process_mapper_event, FlowMapperState, MapperContext, StateChange};
use crate::error::{FlowMapperError, FlowMapperResult};
use crate::metrics;
use crate::ports::inbound::FlowMapperApi;
use crate::ports::outbound::FlowMapperStateStore;
use crate::scheduler::{CleanupRebalanceListener, ScheduledTaskState};
use async_trait::async_trait;
use shared_bus::{RebalanceListener, RecordPublisher};
use shared_types::{Record, RecordValue, StateLookup, TimeSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Flow Mapper implementation
pub struct FlowMapperService<S, P>
where
    S: FlowMapperStateStore,
    P: RecordPublisher + 'static,
{
    config: FlowMapperConfig,
    store: Arc<S>,
    publisher: Arc<P>,
    listener: CleanupRebalanceListener<P>,
    clock: Arc<dyn TimeSource>,
}

impl<S, P> FlowMapperService<S, P>
where
    S: FlowMapperStateStore,
    P: RecordPublisher + 'static,
{
    pub fn new(
        config: FlowMapperConfig,
        store: Arc<S>,
        publisher: Arc<P>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let tasks = Arc::new(ScheduledTaskState::new(
            Arc::clone(&publisher),
            Arc::clone(&clock),
        ));
        let listener = CleanupRebalanceListener::new(tasks, Arc::clone(&clock));
        Self {
            config,
            store,
            publisher,
            listener,
            clock,
        }
    }

    pub fn config(&self) -> &FlowMapperConfig {
        &self.config
    }

    /// Cleanup timers owned by this service.
    pub fn scheduled_tasks(&self) -> &Arc<ScheduledTaskState<P>> {
        self.listener.tasks()
    }

    async fn process_record(
        &self,
        record: Record,
        updates: &mut HashMap<String, Option<FlowMapperState>>,
    ) -> FlowMapperResult<Vec<Record>> {
        let RecordValue::MapperEvent(event) = record.value else {
            warn!(key = %record.key, topic = %record.topic, "Skipping record without mapper event");
            return Ok(Vec::new());
        };
        let key = record.key;

        let lookup = self
            .store
            .get(&key)
            .await
            .map_err(FlowMapperError::Store)?;
        debug!(key = %key, event = event.label(), "Processing mapper event");

        let ctx = MapperContext {
            key: &key,
            now: self.clock.now(),
            config: &self.config,
        };
        let outcome = process_mapper_event(lookup, event, &ctx);

        match outcome.change {
            StateChange::Unchanged => {}
            StateChange::Update(state) => {
                state
                    .check_invariants()
                    .map_err(|reason| FlowMapperError::InvariantViolation {
                        key: key.clone(),
                        reason,
                    })?;
                self.store
                    .put(&key, &state)
                    .await
                    .map_err(FlowMapperError::Store)?;
                updates.insert(key.clone(), Some(state));
            }
            StateChange::Delete => {
                self.store
                    .delete(&key)
                    .await
                    .map_err(FlowMapperError::Store)?;
                updates.insert(key.clone(), None);
            }
        }

        self.publisher
            .publish_all(outcome.records.clone())
            .await
            .map_err(FlowMapperError::Publish)?;

        if outcome.forwarded > 0 {
            metrics::record_events_forwarded(outcome.forwarded);
        }
        if outcome.stray {
            metrics::record_stray_event();
        }
        Ok(outcome.records)
    }
}

#[async_trait]
impl<S, P> FlowMapperApi for FlowMapperService<S, P>
where
    S: FlowMapperStateStore,
    P: RecordPublisher + 'static,
{
    async fn on_next(&self, records: Vec<Record>) -> FlowMapperResult<Vec<Record>> {
        let mut updates = HashMap::new();
        let mut published = Vec::new();
        let mut result = Ok(());

        for record in records {
            match self.process_record(record, &mut updates).await {
                Ok(records) => published.extend(records),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        // Writes that landed before a failure are committed state too.
        if !updates.is_empty() {
            self.listener.on_post_commit(&updates).await;
        }
        result.map(|()| published)
    }

    async fn get_state(&self, key: &str) -> FlowMapperResult<StateLookup<FlowMapperState>> {
        self.store.get(key).await.map_err(FlowMapperError::Store)
    }
}

#[async_trait]
impl<S, P> RebalanceListener<FlowMapperState> for FlowMapperService<S, P>
where
    S: FlowMapperStateStore,
    P: RecordPublisher + 'static,
{
    async fn on_partition_lost(&self, states: &HashMap<String, FlowMapperState>) {
        self.listener.on_partition_lost(states).await;
    }

    async fn on_partition_synced(&self, states: &HashMap<String, FlowMapperState>) {
        self.listener.on_partition_synced(states).await;
    }

    async fn on_post_commit(&self, updates: &HashMap<String, Option<FlowMapperState>>) {
        self.listener.on_post_commit(updates).await;
    }
}
