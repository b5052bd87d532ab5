//! # Session Events
//!
//! A `SessionEvent` is one protocol message. It is immutable once built;
//! processors that need a variant (e.g. an error stripped of its sequence
//! number) construct a new value.

use crate::errors::ErrorEnvelope;
use crate::session::SessionId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Protocol payload of a session event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPayload {
    /// Opens the session. Always sequence number 1.
    Init { payload: Vec<u8> },
    /// Application data.
    Data { payload: Vec<u8> },
    /// The sender will emit no further data.
    Close,
    /// Receipt for sequenced events. Out-of-band (no sequence number).
    Ack {
        /// Last contiguous sequence number the sender has fully processed.
        received_sequence_num: u64,
        /// Sequence numbers held beyond the contiguous point.
        out_of_order_sequence_nums: BTreeSet<u64>,
    },
    /// Protocol error. Out-of-band (no sequence number).
    Error { error: ErrorEnvelope },
}

/// Discriminant of [`SessionPayload`], handy for logging and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Init,
    Data,
    Close,
    Ack,
    Error,
}

impl EventKind {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Data => "data",
            Self::Close => "close",
            Self::Ack => "ack",
            Self::Error => "error",
        }
    }
}

/// Structural problems with an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    /// A sequenced kind arrived without a sequence number.
    #[error("{kind:?} event for session {session_id} has no sequence number")]
    MissingSequenceNumber { session_id: SessionId, kind: EventKind },

    /// Sequence numbers start at 1.
    #[error("{kind:?} event for session {session_id} has sequence number 0")]
    ZeroSequenceNumber { session_id: SessionId, kind: EventKind },

    /// Init must be the first event of a session.
    #[error("Init event for session {session_id} has sequence number {sequence_num}, expected 1")]
    InitNotFirst { session_id: SessionId, sequence_num: u64 },

    /// Acks are out-of-band and must not carry a sequence number.
    #[error("Ack event for session {session_id} carries sequence number {sequence_num}")]
    SequencedAck { session_id: SessionId, sequence_num: u64 },
}

/// A single session protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session id as seen by the side that created the event.
    pub session_id: SessionId,
    /// Position in the sender's stream. `None` for Ack and Error.
    pub sequence_num: Option<u64>,
    /// Creation instant (epoch millis).
    pub timestamp: Timestamp,
    /// Protocol payload.
    pub payload: SessionPayload,
}

impl SessionEvent {
    /// Build an Init event (sequence number 1).
    pub fn init(session_id: impl Into<SessionId>, timestamp: Timestamp, payload: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            sequence_num: Some(1),
            timestamp,
            payload: SessionPayload::Init { payload },
        }
    }

    /// Build a Data event. The sequence number is assigned by the send processor.
    pub fn data(session_id: impl Into<SessionId>, timestamp: Timestamp, payload: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            sequence_num: None,
            timestamp,
            payload: SessionPayload::Data { payload },
        }
    }

    /// Build a Close event. The sequence number is assigned by the send processor.
    pub fn close(session_id: impl Into<SessionId>, timestamp: Timestamp) -> Self {
        Self {
            session_id: session_id.into(),
            sequence_num: None,
            timestamp,
            payload: SessionPayload::Close,
        }
    }

    /// Build an Ack event.
    pub fn ack(
        session_id: impl Into<SessionId>,
        timestamp: Timestamp,
        received_sequence_num: u64,
        out_of_order_sequence_nums: BTreeSet<u64>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sequence_num: None,
            timestamp,
            payload: SessionPayload::Ack {
                received_sequence_num,
                out_of_order_sequence_nums,
            },
        }
    }

    /// Build an Error event.
    pub fn error(session_id: impl Into<SessionId>, timestamp: Timestamp, error: ErrorEnvelope) -> Self {
        Self {
            session_id: session_id.into(),
            sequence_num: None,
            timestamp,
            payload: SessionPayload::Error { error },
        }
    }

    /// Copy of this event with the given sequence number.
    #[must_use]
    pub fn with_sequence_num(&self, sequence_num: Option<u64>) -> Self {
        Self {
            sequence_num,
            ..self.clone()
        }
    }

    /// Copy of this event addressed with another session id.
    #[must_use]
    pub fn with_session_id(&self, session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            ..self.clone()
        }
    }

    /// Copy of this event stamped with a new creation instant (used on resend).
    #[must_use]
    pub fn with_timestamp(&self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Kind of the payload.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.payload {
            SessionPayload::Init { .. } => EventKind::Init,
            SessionPayload::Data { .. } => EventKind::Data,
            SessionPayload::Close => EventKind::Close,
            SessionPayload::Ack { .. } => EventKind::Ack,
            SessionPayload::Error { .. } => EventKind::Error,
        }
    }

    /// Init, Data and Close travel in the sequenced stream.
    #[must_use]
    pub fn is_sequenced(&self) -> bool {
        matches!(
            self.payload,
            SessionPayload::Init { .. } | SessionPayload::Data { .. } | SessionPayload::Close
        )
    }

    /// Check the structural rules for an event received from a counterparty.
    ///
    /// # Errors
    ///
    /// Returns the first rule the event breaks.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        let kind = self.kind();
        match (&self.payload, self.sequence_num) {
            (SessionPayload::Ack { .. }, Some(sequence_num)) => {
                Err(EventValidationError::SequencedAck {
                    session_id: self.session_id.clone(),
                    sequence_num,
                })
            }
            (SessionPayload::Ack { .. } | SessionPayload::Error { .. }, _) => Ok(()),
            (_, None) => Err(EventValidationError::MissingSequenceNumber {
                session_id: self.session_id.clone(),
                kind,
            }),
            (_, Some(0)) => Err(EventValidationError::ZeroSequenceNumber {
                session_id: self.session_id.clone(),
                kind,
            }),
            (SessionPayload::Init { .. }, Some(sequence_num)) if sequence_num != 1 => {
                Err(EventValidationError::InitNotFirst {
                    session_id: self.session_id.clone(),
                    sequence_num,
                })
            }
            _ => Ok(()),
        }
    }
}
