//! Error types for the Session Manager
//!
//! Protocol problems never surface here: they become session state (ERROR)
//! and typed payloads for the flow. These errors are for I/O the caller
//! should retry and for bugs that must stop the pipeline.

use shared_bus::BusError;
use shared_types::{FlowId, SessionId};
use thiserror::Error;

/// Session Manager errors
#[derive(Debug, Error)]
pub enum SessionManagerError {
    /// Reading or writing the session state store failed
    #[error("Session state store error: {0}")]
    Store(BusError),

    /// Publishing an outbound record failed
    #[error("Publish failed: {0}")]
    Publish(BusError),

    /// The flow engine refused a delivery
    #[error("Delivery to flow {flow_id} failed: {reason}")]
    Delivery { flow_id: FlowId, reason: String },

    /// A processor produced a state that breaks the sequencing invariants
    #[error("Invariant violated for session {session_id}: {reason}")]
    InvariantViolation { session_id: SessionId, reason: String },
}

impl SessionManagerError {
    /// Whether retrying the triggering batch may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) | Self::Publish(e) => e.is_transient(),
            Self::Delivery { .. } => true,
            Self::InvariantViolation { .. } => false,
        }
    }
}

/// Result type for session manager operations
pub type SessionManagerResult<T> = Result<T, SessionManagerError>;
