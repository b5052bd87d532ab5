//! # Session Identity
//!
//! Both halves of a logical session share one identifier stem:
//!
//! ```text
//! Initiator (Alice)                         Responder (Bob)
//!   key: "abc"       ── Init/Data ──→        key: "abc-INITIATED"
//!                    ←── Ack/Data ──
//! ```
//!
//! A locally-initiated session id is bare. The counterparty-initiated half
//! carries [`INITIATED_SESSION_ID_SUFFIX`]. Every event carries the session id
//! of the side that *created* it, so a receiver compares that id against its
//! own key to learn the direction.

use serde::{Deserialize, Serialize};

/// Session identifier as seen by one side of the session.
pub type SessionId = String;

/// Identifier of a flow inside the local flow engine.
pub type FlowId = String;

/// Reserved suffix marking the counterparty-initiated half of a session.
pub const INITIATED_SESSION_ID_SUFFIX: &str = "-INITIATED";

/// Returns true if `session_id` names the counterparty-initiated half.
#[must_use]
pub fn is_initiated_id(session_id: &str) -> bool {
    session_id.ends_with(INITIATED_SESSION_ID_SUFFIX)
}

/// Flip between the initiator's and the responder's view of a session id.
#[must_use]
pub fn toggle_session_id(session_id: &str) -> SessionId {
    match session_id.strip_suffix(INITIATED_SESSION_ID_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => format!("{session_id}{INITIATED_SESSION_ID_SUFFIX}"),
    }
}

/// The id the counterparty uses for the session keyed locally by `key`.
#[must_use]
pub fn counterparty_session_id(key: &str) -> SessionId {
    toggle_session_id(key)
}

/// Logical direction of an event relative to the local side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageDirection {
    /// Created by the counterparty, travelling towards the local flow.
    Inbound,
    /// Created by the local flow, travelling towards the counterparty.
    Outbound,
}

impl MessageDirection {
    /// Derive the direction of an event stored under `key`.
    ///
    /// - `event_session_id == key` → the local side created it (Outbound)
    /// - `event_session_id == toggle(key)` → the counterparty created it (Inbound)
    /// - anything else → undeterminable, `None`
    #[must_use]
    pub fn derive(key: &str, event_session_id: &str) -> Option<Self> {
        if event_session_id == key {
            Some(Self::Outbound)
        } else if event_session_id == toggle_session_id(key) {
            Some(Self::Inbound)
        } else {
            None
        }
    }
}
