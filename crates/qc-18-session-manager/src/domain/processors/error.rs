//! Error processors.
//!
//! Errors are out-of-band: they never carry a sequence number, are never
//! deduplicated against the data stream and are never retired by an Ack.

use super::{FlowDelivery, ProcessorContext, ProcessorOutcome};
use crate::domain::state::{SessionState, SessionStatus};
use shared_types::{SessionEvent, SessionPayload, StateLookup};
use tracing::{debug, warn};

/// Error raised by the local flow.
///
/// Without local state the error is still transmitted: the new ERROR
/// record's outbox holds only the error event.
pub fn send(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let error_event = event.with_sequence_num(None);

    let mut state = match lookup {
        StateLookup::Known(state) => {
            if state.status.is_terminal() {
                debug!(key = ctx.key, status = state.status.as_str(), "Session already terminal");
                return ProcessorOutcome::unchanged();
            }
            state
        }
        StateLookup::Unknown => {
            warn!(key = ctx.key, "Flow raised error on unknown session");
            SessionState::new(ctx.key, ctx.flow_id.cloned(), SessionStatus::Error, ctx.now)
        }
        StateLookup::Tombstoned => {
            debug!(key = ctx.key, "Discarding error for retired session");
            return ProcessorOutcome::unchanged();
        }
    };

    state.status = SessionStatus::Error;
    state
        .send_events_state
        .undelivered_messages
        .push(error_event.clone());

    ProcessorOutcome {
        outbound: vec![error_event],
        cleanup_at: Some(ctx.now),
        ..ProcessorOutcome::with_state(state)
    }
}

/// Error from the counterparty.
///
/// The session fails: pending outbox entries are dropped, the flow gets
/// the typed error and cleanup is requested immediately.
pub fn receive(
    lookup: StateLookup<SessionState>,
    event: &SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let SessionPayload::Error { error } = &event.payload else {
        return ProcessorOutcome::unchanged();
    };

    let mut state = match lookup {
        StateLookup::Known(state) if !state.status.is_terminal() => state,
        StateLookup::Known(_) => {
            debug!(key = ctx.key, "Session already terminal, ignoring peer error");
            return ProcessorOutcome::unchanged();
        }
        StateLookup::Unknown | StateLookup::Tombstoned => {
            warn!(key = ctx.key, %error, "Discarding error for session with no state");
            return ProcessorOutcome::unchanged();
        }
    };

    warn!(key = ctx.key, %error, "Counterparty failed session");
    state.status = SessionStatus::Error;
    state.send_events_state.undelivered_messages.clear();
    state.receive_events_state.out_of_order_messages.clear();
    state.receive_events_state.last_processed_timestamp = ctx.now;

    ProcessorOutcome {
        deliveries: vec![FlowDelivery::Error(error.clone())],
        cleanup_at: Some(ctx.now),
        ..ProcessorOutcome::with_state(state)
    }
}
