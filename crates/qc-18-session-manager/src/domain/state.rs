//! # Session State
//!
//! One record per local session id, persisted in the keyed state store.
//! It is the unit of consistency: every processor reads one and writes one.

use super::dedup::SequencingState;
use serde::{Deserialize, Serialize};
use shared_types::{FlowId, SessionEvent, SessionId, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Init sent, not yet acknowledged.
    Created,
    /// Both sides know the session.
    Confirmed,
    /// A Close has been sent or received.
    Closing,
    /// Both Closes delivered and acknowledged. Terminal.
    Closed,
    /// Terminal.
    Error,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Confirmed => "CONFIRMED",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
            Self::Error => "ERROR",
        }
    }
}

/// Sender side of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEventsState {
    /// Sequence number the next Data or Close gets.
    pub next_sequence_number_to_send: u64,
    /// Sent but not yet acknowledged, in send order.
    pub undelivered_messages: Vec<SessionEvent>,
    /// Sequence number of our Close, once sent.
    pub close_sequence_num: Option<u64>,
}

impl SendEventsState {
    fn new() -> Self {
        Self {
            next_sequence_number_to_send: 1,
            undelivered_messages: Vec::new(),
            close_sequence_num: None,
        }
    }

    /// Whether our Close has been sent and acknowledged.
    #[must_use]
    pub fn close_acknowledged(&self) -> bool {
        match self.close_sequence_num {
            Some(close_seq) => !self
                .undelivered_messages
                .iter()
                .any(|e| e.sequence_num == Some(close_seq)),
            None => false,
        }
    }

    /// Whether anything numbered before our Close is still unacknowledged.
    #[must_use]
    pub fn has_pending_data(&self) -> bool {
        self.undelivered_messages.iter().any(|e| match e.sequence_num {
            Some(seq) => self.close_sequence_num.map_or(true, |close_seq| seq < close_seq),
            None => false,
        })
    }
}

/// Receiver side of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveEventsState {
    /// Highest sequence number delivered in order. `None` until the first event.
    pub last_contiguous_sequence_received: Option<u64>,
    /// Events received ahead of the contiguous point, keyed by sequence number.
    pub out_of_order_messages: BTreeMap<u64, SessionEvent>,
    /// The counterparty's Close has been delivered.
    pub close_received: bool,
    /// Arrival time of the latest counterparty event.
    pub last_processed_timestamp: Timestamp,
}

impl ReceiveEventsState {
    fn new(now: Timestamp) -> Self {
        Self {
            last_contiguous_sequence_received: None,
            out_of_order_messages: BTreeMap::new(),
            close_received: false,
            last_processed_timestamp: now,
        }
    }

    /// The dedup engine's view of this state.
    #[must_use]
    pub fn sequencing(&self) -> SequencingState {
        SequencingState {
            expected_next: self.last_contiguous_sequence_received.map(|last| last + 1),
            out_of_order: self.out_of_order_messages.keys().copied().collect(),
        }
    }

    /// Sequence numbers held in the reorder buffer.
    #[must_use]
    pub fn out_of_order_sequence_nums(&self) -> BTreeSet<u64> {
        self.out_of_order_messages.keys().copied().collect()
    }
}

/// Persisted state of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Local session id (the store key).
    pub session_id: SessionId,
    /// Local flow bound to this session, once known.
    pub flow_id: Option<FlowId>,
    pub status: SessionStatus,
    pub send_events_state: SendEventsState,
    pub receive_events_state: ReceiveEventsState,
    /// Set on entering CLOSING. Cleanup is due at this instant.
    pub expiry_timestamp: Option<Timestamp>,
}

impl SessionState {
    /// Fresh state with nothing sent or received.
    pub fn new(
        session_id: impl Into<SessionId>,
        flow_id: Option<FlowId>,
        status: SessionStatus,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            flow_id,
            status,
            send_events_state: SendEventsState::new(),
            receive_events_state: ReceiveEventsState::new(now),
            expiry_timestamp: None,
        }
    }

    /// Check the sequencing invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first broken invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        let last = self.receive_events_state.last_contiguous_sequence_received;
        for (seq, event) in &self.receive_events_state.out_of_order_messages {
            if Some(*seq) <= last {
                return Err(format!(
                    "buffered sequence {seq} is not beyond contiguous point {last:?}"
                ));
            }
            if event.sequence_num != Some(*seq) {
                return Err(format!(
                    "buffered event under {seq} carries sequence {:?}",
                    event.sequence_num
                ));
            }
        }
        Ok(())
    }
}
