//! Session Manager Service
//!
//! Drives the pure processors against the state store, the log and the
//! flow engine. For every record:
//!
//! 1. read the session state
//! 2. run the processor and collect due resends
//! 3. publish outbound events and cleanup requests
//! 4. write the new state
//! 5. hand deliveries to the flow engine
//!
//! Publishing before writing keeps replays safe: a batch retried after a
//! failed write re-publishes the same sequence numbers, which the
//! counterparty deduplicates.
//!
//! Steps 1 to 5 run under the key's lock. Batches, housekeeping and
//! retirement may be driven from different tasks at once.

use crate::config::SessionManagerConfig;
use crate::domain::{
    check_timeout, messages_to_send, process_event, FlowDelivery, ProcessorContext,
    ProcessorOutcome, SessionState, SessionStatus,
};
use crate::error::{SessionManagerError, SessionManagerResult};
use crate::key_lock::KeyLocks;
use crate::metrics;
use crate::ports::inbound::{SessionManagerApi, SessionRecord};
use crate::ports::outbound::{FlowEngine, SessionStateStore};
use async_trait::async_trait;
use shared_bus::RecordPublisher;
use shared_types::{
    EventKind, FlowId, FlowMapperEvent, Record, SessionId, StateLookup, TimeSource,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session Manager implementation
pub struct SessionManagerService<S, P, F>
where
    S: SessionStateStore,
    P: RecordPublisher,
    F: FlowEngine,
{
    config: SessionManagerConfig,
    store: Arc<S>,
    publisher: Arc<P>,
    flow_engine: Arc<F>,
    clock: Arc<dyn TimeSource>,
    locks: KeyLocks,
}

impl<S, P, F> SessionManagerService<S, P, F>
where
    S: SessionStateStore,
    P: RecordPublisher,
    F: FlowEngine,
{
    pub fn new(
        config: SessionManagerConfig,
        store: Arc<S>,
        publisher: Arc<P>,
        flow_engine: Arc<F>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            store,
            publisher,
            flow_engine,
            clock,
            locks: KeyLocks::default(),
        }
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    async fn load(&self, key: &str) -> SessionManagerResult<StateLookup<SessionState>> {
        self.store.get(key).await.map_err(SessionManagerError::Store)
    }

    async fn process_record(&self, record: SessionRecord) -> SessionManagerResult<Vec<Record>> {
        let _guard = self.locks.lock(&record.key).await;
        let now = self.clock.now();
        let lookup = self.load(&record.key).await?;
        let previous = lookup.known().map(|s| s.status);
        let kind = record.event.kind();

        debug!(
            key = %record.key,
            session_id = %record.event.session_id,
            kind = kind.as_str(),
            sequence_num = ?record.event.sequence_num,
            "Processing session event"
        );

        let ctx = ProcessorContext {
            key: &record.key,
            flow_id: record.flow_id.as_ref(),
            now,
            config: &self.config,
        };
        let mut outcome = process_event(lookup, record.event.clone(), &ctx);
        if let Some(state) = outcome.state.as_mut() {
            let resent = messages_to_send(state, &ctx);
            if !resent.is_empty() {
                metrics::record_events_resent(resent.len() as u64);
                outcome.outbound.extend(resent);
            }
        }

        let is_peer_ack = kind == EventKind::Ack && record.event.session_id != record.key;
        if is_peer_ack && outcome.state.is_some() {
            metrics::record_ack_processed();
        }

        self.commit(&record.key, previous, outcome, record.flow_id.as_ref())
            .await
    }

    /// Publish, persist and deliver one outcome.
    async fn commit(
        &self,
        key: &str,
        previous: Option<SessionStatus>,
        outcome: ProcessorOutcome,
        record_flow: Option<&FlowId>,
    ) -> SessionManagerResult<Vec<Record>> {
        if let Some(state) = &outcome.state {
            state
                .check_invariants()
                .map_err(|reason| SessionManagerError::InvariantViolation {
                    session_id: key.to_string(),
                    reason,
                })?;
        }

        let flow_id = outcome
            .state
            .as_ref()
            .and_then(|s| s.flow_id.clone())
            .or_else(|| record_flow.cloned());

        let mut records: Vec<Record> = outcome
            .outbound
            .iter()
            .map(|event| {
                let bound_flow = match event.kind() {
                    EventKind::Init => flow_id.clone(),
                    _ => None,
                };
                Record::mapper_event(
                    key,
                    FlowMapperEvent::Session {
                        event: event.clone(),
                        flow_id: bound_flow,
                    },
                )
            })
            .collect();
        if let Some(expiry) = outcome.cleanup_at {
            records.push(Record::mapper_event(
                key,
                FlowMapperEvent::ScheduleCleanup {
                    expiry_time: Some(expiry),
                },
            ));
        }

        self.publisher
            .publish_all(records.clone())
            .await
            .map_err(SessionManagerError::Publish)?;

        if let Some(state) = &outcome.state {
            self.store
                .put(key, state)
                .await
                .map_err(SessionManagerError::Store)?;

            if previous != Some(state.status) {
                debug!(key, status = state.status.as_str(), "Session status changed");
            }
            if state.status == SessionStatus::Error && previous != Some(SessionStatus::Error) {
                metrics::record_session_errored(outcome.error_type().unwrap_or("unknown"));
            }
        }

        if outcome.duplicates > 0 {
            metrics::record_duplicate_dropped();
        }
        self.deliver_all(key, flow_id.as_ref(), outcome.deliveries)
            .await;

        Ok(records)
    }

    async fn deliver_all(&self, key: &str, flow_id: Option<&FlowId>, deliveries: Vec<FlowDelivery>) {
        if deliveries.is_empty() {
            return;
        }
        let Some(flow_id) = flow_id else {
            warn!(key, count = deliveries.len(), "No flow bound to session, dropping deliveries");
            return;
        };

        let payloads = deliveries
            .iter()
            .filter(|d| matches!(d, FlowDelivery::Payload { .. }))
            .count() as u64;
        for delivery in deliveries {
            if let Err(e) = self.flow_engine.deliver(flow_id, delivery).await {
                warn!(key, flow_id = %flow_id, error = %e, "Flow delivery failed");
            }
        }
        metrics::record_payloads_delivered(payloads);
    }
}

#[async_trait]
impl<S, P, F> SessionManagerApi for SessionManagerService<S, P, F>
where
    S: SessionStateStore,
    P: RecordPublisher,
    F: FlowEngine,
{
    async fn on_next(&self, records: Vec<SessionRecord>) -> SessionManagerResult<Vec<Record>> {
        let mut published = Vec::new();
        for record in records {
            published.extend(self.process_record(record).await?);
        }
        Ok(published)
    }

    async fn housekeep(&self, keys: &[SessionId]) -> SessionManagerResult<Vec<Record>> {
        let mut published = Vec::new();

        for key in keys {
            let _guard = self.locks.lock(key).await;
            let now = self.clock.now();
            let StateLookup::Known(mut state) = self.load(key).await? else {
                continue;
            };
            let previous = Some(state.status);
            let flow_id = state.flow_id.clone();
            let ctx = ProcessorContext {
                key,
                flow_id: flow_id.as_ref(),
                now,
                config: &self.config,
            };

            let outcome = match check_timeout(&state, &ctx) {
                Some(timed_out) => timed_out,
                None => {
                    let resent = messages_to_send(&mut state, &ctx);
                    if resent.is_empty() {
                        continue;
                    }
                    metrics::record_events_resent(resent.len() as u64);
                    ProcessorOutcome {
                        outbound: resent,
                        ..ProcessorOutcome::with_state(state)
                    }
                }
            };
            published.extend(self.commit(key, previous, outcome, flow_id.as_ref()).await?);
        }
        Ok(published)
    }

    async fn retire(&self, key: &str) -> SessionManagerResult<bool> {
        let _guard = self.locks.lock(key).await;
        match self.load(key).await? {
            StateLookup::Known(state) if state.status.is_terminal() => {
                self.store
                    .delete(key)
                    .await
                    .map_err(SessionManagerError::Store)?;
                info!(key, status = state.status.as_str(), "Session retired");
                Ok(true)
            }
            StateLookup::Known(state) => {
                warn!(key, status = state.status.as_str(), "Refusing to retire live session");
                Ok(false)
            }
            StateLookup::Unknown | StateLookup::Tombstoned => Ok(false),
        }
    }

    async fn get_state(&self, key: &str) -> SessionManagerResult<StateLookup<SessionState>> {
        self.load(key).await
    }
}
