//! # Error Payloads
//!
//! Typed error payloads carried by `SessionPayload::Error` and surfaced to
//! the flow engine. These are protocol values, not Rust errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error carried inside a session event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Machine-readable category (see the `error_types` constants).
    pub error_type: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorEnvelope {
    /// Create a new error envelope.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

/// Well-known `ErrorEnvelope::error_type` values.
pub mod error_types {
    /// Ack received for a session with no local state.
    pub const ACK_NULL_STATE: &str = "SessionAck-NullState";
    /// Data received for a session with no local state.
    pub const DATA_NULL_STATE: &str = "SessionData-NullState";
    /// Close received for a session with no local state.
    pub const CLOSE_NULL_STATE: &str = "SessionClose-NullState";
    /// Data or Close requested locally for a session with no local state.
    pub const SEND_NULL_STATE: &str = "SessionSend-NullState";
    /// Error requested locally for a session with no local state.
    pub const ERROR_NULL_STATE: &str = "SessionError-NullState";
    /// Init sent or received for a session that already exists.
    pub const DUPLICATE_INIT: &str = "SessionInit-Duplicate";
    /// Event violates the session protocol (bad ordering, bad state).
    pub const PROTOCOL_VIOLATION: &str = "Session-ProtocolViolation";
    /// Event is structurally malformed.
    pub const MALFORMED_EVENT: &str = "Session-MalformedEvent";
    /// No counterparty traffic within the session timeout.
    pub const SESSION_TIMEOUT: &str = "Session-Timeout";
    /// The close handshake did not finish before the session's expiry.
    pub const CLOSE_EXPIRED: &str = "SessionClose-Expired";
    /// The flow mapper has no record of the session.
    pub const MAPPER_UNKNOWN_SESSION: &str = "FlowMapper-UnknownSession";
    /// The flow mapper's record of the session has expired.
    pub const MAPPER_SESSION_EXPIRED: &str = "FlowMapper-SessionExpired";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_type_and_message() {
        let error = ErrorEnvelope::new(error_types::SESSION_TIMEOUT, "no traffic");
        assert_eq!(error.to_string(), "[Session-Timeout] no traffic");
    }
}
