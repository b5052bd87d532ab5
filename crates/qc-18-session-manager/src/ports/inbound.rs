//! Driving Ports (API - Inbound)

use crate::domain::SessionState;
use crate::error::SessionManagerResult;
use async_trait::async_trait;
use shared_types::{
    toggle_session_id, FlowEvent, FlowId, Record, RecordValue, SessionEvent, SessionId,
    StateLookup,
};

/// One event to process, with the context it arrived in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// Local session id the event belongs to.
    pub key: SessionId,
    /// Flow that sent the event or that it was routed to.
    pub flow_id: Option<FlowId>,
    pub event: SessionEvent,
}

impl SessionRecord {
    pub fn new(key: impl Into<SessionId>, flow_id: Option<FlowId>, event: SessionEvent) -> Self {
        Self {
            key: key.into(),
            flow_id,
            event,
        }
    }

    /// An event the local flow wants to send. Keyed by the event's own id.
    pub fn outbound(flow_id: impl Into<FlowId>, event: SessionEvent) -> Self {
        Self::new(event.session_id.clone(), Some(flow_id.into()), event)
    }

    /// A counterparty event routed to the local flow by the mapper.
    #[must_use]
    pub fn inbound(flow_event: FlowEvent) -> Self {
        let key = toggle_session_id(&flow_event.event.session_id);
        Self::new(key, Some(flow_event.flow_id), flow_event.event)
    }

    /// Build from a record on the flow event topic.
    #[must_use]
    pub fn from_flow_record(record: &Record) -> Option<Self> {
        match &record.value {
            RecordValue::FlowEvent(flow_event) => Some(Self::inbound(flow_event.clone())),
            _ => None,
        }
    }
}

/// Primary Session Manager API
///
/// Processing is at-least-once: a failed batch is retried from its first
/// record, and every state transition is idempotent under replay.
#[async_trait]
pub trait SessionManagerApi: Send + Sync {
    /// Process a batch in order.
    ///
    /// # Returns
    /// * Every record published for the batch, in publish order
    ///
    /// # Errors
    /// * Store or publish failures (transient, retry the batch)
    /// * Invariant violations (fatal)
    async fn on_next(&self, records: Vec<SessionRecord>) -> SessionManagerResult<Vec<Record>>;

    /// Apply session timeout and resend to the given sessions.
    async fn housekeep(&self, keys: &[SessionId]) -> SessionManagerResult<Vec<Record>>;

    /// Tombstone a terminal session.
    ///
    /// # Returns
    /// * `true` if a terminal state was retired
    async fn retire(&self, key: &str) -> SessionManagerResult<bool>;

    /// Current stored state of a session.
    async fn get_state(&self, key: &str) -> SessionManagerResult<StateLookup<SessionState>>;
}
