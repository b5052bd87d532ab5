//! # Session Event Processors
//!
//! One processor per event kind and direction. Every processor is a pure
//! function of `(stored state, event, context)` and returns a
//! [`ProcessorOutcome`]; the service layer does the I/O.
//!
//! | Direction | Init | Data | Close | Ack | Error |
//! |-----------|------|------|-------|-----|-------|
//! | Inbound   | `init::receive` | `data::receive` | `data::receive` | `ack::receive` | `error::receive` |
//! | Outbound  | `init::send` | `data::send` | `close::send` | discarded | `error::send` |
//!
//! Malformed or stray input never aborts processing. It becomes an ERROR
//! state, a typed error for the flow, or a logged discard.

pub mod ack;
pub mod close;
pub mod data;
pub mod error;
pub mod init;

use super::state::{SessionState, SessionStatus};
use crate::config::SessionManagerConfig;
use shared_types::{
    error_types, ErrorEnvelope, FlowId, MessageDirection, SessionEvent, SessionPayload,
    StateLookup, Timestamp,
};
use tracing::warn;

/// Inputs shared by every processor besides the state and the event.
#[derive(Clone, Copy, Debug)]
pub struct ProcessorContext<'a> {
    /// Local session id the event is processed under.
    pub key: &'a str,
    /// Flow the triggering record was addressed to or sent by, if any.
    pub flow_id: Option<&'a FlowId>,
    pub now: Timestamp,
    pub config: &'a SessionManagerConfig,
}

/// What a flow is told about its session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowDelivery {
    /// An in-order, deduplicated payload from the counterparty.
    Payload { sequence_num: u64, payload: Vec<u8> },
    /// The counterparty will send nothing more.
    Closed,
    /// The session failed.
    Error(ErrorEnvelope),
}

/// Result of processing one event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessorOutcome {
    /// State to write. `None` leaves the stored record untouched.
    pub state: Option<SessionState>,
    /// Events for the counterparty, in send order.
    pub outbound: Vec<SessionEvent>,
    /// Notifications for the local flow, in delivery order.
    pub deliveries: Vec<FlowDelivery>,
    /// Request mapper cleanup at this instant.
    pub cleanup_at: Option<Timestamp>,
    /// Sequenced events dropped as already delivered.
    pub duplicates: u64,
}

impl ProcessorOutcome {
    /// Leave everything as it is.
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Tell the flow its request was refused, without touching the state.
    #[must_use]
    pub fn rejected(error: ErrorEnvelope) -> Self {
        Self {
            deliveries: vec![FlowDelivery::Error(error)],
            ..Self::default()
        }
    }

    /// Error type of the first error this outcome carries, if any.
    #[must_use]
    pub fn error_type(&self) -> Option<&str> {
        self.deliveries
            .iter()
            .find_map(|d| match d {
                FlowDelivery::Error(error) => Some(error.error_type.as_str()),
                _ => None,
            })
            .or_else(|| {
                self.outbound.iter().find_map(|e| match &e.payload {
                    SessionPayload::Error { error } => Some(error.error_type.as_str()),
                    _ => None,
                })
            })
    }
}

/// Route one event to its processor.
pub fn process_event(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let Some(direction) = MessageDirection::derive(ctx.key, &event.session_id) else {
        warn!(
            key = ctx.key,
            session_id = %event.session_id,
            kind = event.kind().as_str(),
            "Discarding event whose session id matches neither side of the key"
        );
        return ProcessorOutcome::unchanged();
    };

    match direction {
        MessageDirection::Inbound => {
            if let Err(e) = event.validate() {
                return malformed(lookup, &e.to_string(), ctx);
            }
            match &event.payload {
                SessionPayload::Init { .. } => init::receive(lookup, event, ctx),
                SessionPayload::Data { .. } | SessionPayload::Close => {
                    data::receive(lookup, event, ctx)
                }
                SessionPayload::Ack { .. } => ack::receive(lookup, &event, ctx),
                SessionPayload::Error { .. } => error::receive(lookup, &event, ctx),
            }
        }
        MessageDirection::Outbound => match &event.payload {
            SessionPayload::Init { .. } => init::send(lookup, event, ctx),
            SessionPayload::Data { .. } => data::send(lookup, event, ctx),
            SessionPayload::Close => close::send(lookup, event, ctx),
            SessionPayload::Error { .. } => error::send(lookup, event, ctx),
            SessionPayload::Ack { .. } => {
                warn!(key = ctx.key, "Discarding Ack submitted by the local flow");
                ProcessorOutcome::unchanged()
            }
        },
    }
}

/// A structurally invalid event from the counterparty.
fn malformed(
    lookup: StateLookup<SessionState>,
    reason: &str,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    match lookup {
        StateLookup::Known(state) if !state.status.is_terminal() => {
            warn!(key = ctx.key, reason, "Malformed event, failing session");
            into_error(
                state,
                ErrorEnvelope::new(error_types::MALFORMED_EVENT, reason),
                ctx,
            )
        }
        _ => {
            warn!(key = ctx.key, reason, "Discarding malformed event");
            ProcessorOutcome::unchanged()
        }
    }
}

/// Move `state` to ERROR.
///
/// Pending outbox entries and buffered events are discarded. The error is
/// queued for the counterparty, reported to the flow, and cleanup is
/// requested immediately.
pub(crate) fn into_error(
    mut state: SessionState,
    error: ErrorEnvelope,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let mut outcome = ProcessorOutcome::unchanged();
    fail(&mut state, error, ctx, &mut outcome);
    outcome.state = Some(state);
    outcome
}

/// [`into_error`] for a state that is still being worked on.
pub(crate) fn fail(
    state: &mut SessionState,
    error: ErrorEnvelope,
    ctx: &ProcessorContext<'_>,
    outcome: &mut ProcessorOutcome,
) {
    let event = SessionEvent::error(ctx.key, ctx.now, error.clone());
    state.status = SessionStatus::Error;
    state.send_events_state.undelivered_messages = vec![event.clone()];
    state.receive_events_state.out_of_order_messages.clear();

    outcome.outbound.push(event);
    outcome.deliveries.push(FlowDelivery::Error(error));
    outcome.cleanup_at = Some(ctx.now);
}

/// An event for a session with no local state.
///
/// The result is a terminal ERROR record, never a usable session.
pub(crate) fn stray(error: ErrorEnvelope, ctx: &ProcessorContext<'_>) -> ProcessorOutcome {
    let state = SessionState::new(ctx.key, ctx.flow_id.cloned(), SessionStatus::Error, ctx.now);
    into_error(state, error, ctx)
}

/// Ack describing everything received so far.
pub(crate) fn ack_for(state: &SessionState, ctx: &ProcessorContext<'_>) -> SessionEvent {
    let receive = &state.receive_events_state;
    SessionEvent::ack(
        ctx.key,
        ctx.now,
        receive.last_contiguous_sequence_received.unwrap_or(0),
        receive.out_of_order_sequence_nums(),
    )
}
