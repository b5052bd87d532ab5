//! Events consumed by the flow mapper (qc-19).

use crate::event::SessionEvent;
use crate::session::FlowId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Payload of a record on the flow mapper event topic, keyed by local session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowMapperEvent {
    /// A session event to route.
    ///
    /// `flow_id` is set by the local flow engine on the outbound Init it sends,
    /// so the mapper can bind the session to the initiating flow.
    Session {
        event: SessionEvent,
        flow_id: Option<FlowId>,
    },
    /// Move the mapper state to CLOSING. `None` means "use the configured grace period".
    ScheduleCleanup { expiry_time: Option<Timestamp> },
    /// Delete the mapper state. Published by the cleanup timer.
    ExecuteCleanup,
}

impl FlowMapperEvent {
    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::ScheduleCleanup { .. } => "schedule_cleanup",
            Self::ExecuteCleanup => "execute_cleanup",
        }
    }
}
