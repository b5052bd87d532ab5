//! # Log Records
//!
//! Shapes published to the partitioned log. Routing between components:
//!
//! ```text
//! Session Manager ──FlowMapperEvent──→ [flow.mapper.event] ──→ Flow Mapper
//!                                                                 │
//!          [flow.event] ←──FlowEvent (keyed by flow id)───────────┤
//!          [p2p.out]    ←──SessionEvent (keyed by peer session)───┘
//! ```

use crate::event::SessionEvent;
use crate::mapper::FlowMapperEvent;
use crate::session::FlowId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topics of the partitioned log used by the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Input of the flow mapper, keyed by local session id.
    FlowMapperEvent,
    /// Input of the local flow engine, keyed by flow id.
    FlowEvent,
    /// Output towards the peer-to-peer transport, keyed by the counterparty's session id.
    P2POut,
}

impl Topic {
    /// Wire name of the topic.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlowMapperEvent => "flow.mapper.event",
            Self::FlowEvent => "flow.event",
            Self::P2POut => "p2p.out",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A session event addressed to a flow in the local flow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub flow_id: FlowId,
    pub event: SessionEvent,
}

/// Value carried by a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordValue {
    MapperEvent(FlowMapperEvent),
    FlowEvent(FlowEvent),
    Session(SessionEvent),
}

/// A keyed record bound for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub topic: Topic,
    pub key: String,
    pub value: RecordValue,
}

impl Record {
    pub fn new(topic: Topic, key: impl Into<String>, value: RecordValue) -> Self {
        Self {
            topic,
            key: key.into(),
            value,
        }
    }

    /// Record on the flow mapper event topic.
    pub fn mapper_event(key: impl Into<String>, event: FlowMapperEvent) -> Self {
        Self::new(Topic::FlowMapperEvent, key, RecordValue::MapperEvent(event))
    }

    /// The session event inside the value, whichever topic it is on.
    #[must_use]
    pub fn session_event(&self) -> Option<&SessionEvent> {
        match &self.value {
            RecordValue::Session(event) => Some(event),
            RecordValue::FlowEvent(flow_event) => Some(&flow_event.event),
            RecordValue::MapperEvent(FlowMapperEvent::Session { event, .. }) => Some(event),
            RecordValue::MapperEvent(_) => None,
        }
    }
}
