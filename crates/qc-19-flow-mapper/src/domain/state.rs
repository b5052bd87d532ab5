//! Mapper state: the routing record kept per session key.

use serde::{Deserialize, Serialize};
use shared_types::{FlowId, Timestamp};

/// Lifecycle of a mapper record. Deletion is the terminal step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowMapperStatus {
    /// Routing events for a live session.
    Open,
    /// Cleanup requested; deleted once `expiry_time` passes.
    Closing,
}

impl FlowMapperStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
        }
    }
}

/// Routing state for one session key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMapperState {
    /// Local flow bound to the session. `None` until known.
    pub flow_id: Option<FlowId>,
    /// Instant after which the state is deleted. Set on CLOSING.
    pub expiry_time: Option<Timestamp>,
    pub status: FlowMapperStatus,
}

impl FlowMapperState {
    #[must_use]
    pub fn open(flow_id: Option<FlowId>) -> Self {
        Self {
            flow_id,
            expiry_time: None,
            status: FlowMapperStatus::Open,
        }
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.status == FlowMapperStatus::Closing
    }

    /// CLOSING with an expiry at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.is_closing() && self.expiry_time.is_some_and(|expiry| expiry <= now)
    }

    /// Expiry of a CLOSING state, the instant its cleanup timer targets.
    #[must_use]
    pub fn cleanup_due(&self) -> Option<Timestamp> {
        if self.is_closing() {
            self.expiry_time
        } else {
            None
        }
    }

    /// # Errors
    ///
    /// A CLOSING state without an expiry could never be cleaned up.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.is_closing() && self.expiry_time.is_none() {
            return Err("CLOSING state has no expiry time".to_string());
        }
        Ok(())
    }
}
