//! Init processors.

use super::data::receive_sequenced;
use super::{into_error, ProcessorContext, ProcessorOutcome};
use crate::domain::state::{SessionState, SessionStatus};
use shared_types::{error_types, ErrorEnvelope, SessionEvent, StateLookup};
use tracing::{debug, info, warn};

/// Init from the local flow: open a CREATED session.
pub fn send(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    match lookup {
        StateLookup::Unknown => {}
        StateLookup::Known(_) | StateLookup::Tombstoned => {
            warn!(key = ctx.key, "Flow sent Init for existing session");
            return ProcessorOutcome::rejected(ErrorEnvelope::new(
                error_types::DUPLICATE_INIT,
                format!("session {} already exists", ctx.key),
            ));
        }
    }

    let mut state = SessionState::new(ctx.key, ctx.flow_id.cloned(), SessionStatus::Created, ctx.now);
    let init = event.with_sequence_num(Some(1)).with_timestamp(ctx.now);
    state.send_events_state.next_sequence_number_to_send = 2;
    state.send_events_state.undelivered_messages.push(init.clone());
    info!(key = ctx.key, flow_id = ?ctx.flow_id, "Session created");

    ProcessorOutcome {
        outbound: vec![init],
        ..ProcessorOutcome::with_state(state)
    }
}

/// Init from the counterparty: open a CONFIRMED session.
///
/// A stale Init (outside the validity window) is dropped without creating
/// state. A retransmitted Init for a live session is deduplicated and re-acked.
pub fn receive(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    match lookup {
        StateLookup::Unknown => {
            let state = SessionState::new(
                ctx.key,
                ctx.flow_id.cloned(),
                SessionStatus::Confirmed,
                ctx.now,
            );
            let outcome = receive_sequenced(state, event, ctx);
            let opened = outcome
                .state
                .as_ref()
                .is_some_and(|s| s.receive_events_state.last_contiguous_sequence_received.is_some());
            if !opened {
                warn!(key = ctx.key, "Discarding stale Init");
                return ProcessorOutcome::unchanged();
            }
            info!(key = ctx.key, flow_id = ?ctx.flow_id, "Session confirmed by counterparty");
            outcome
        }
        StateLookup::Tombstoned => {
            debug!(key = ctx.key, "Discarding Init for retired session");
            ProcessorOutcome::unchanged()
        }
        StateLookup::Known(state) => match state.status {
            SessionStatus::Error => ProcessorOutcome::unchanged(),
            SessionStatus::Closed => super::data::reack_duplicate(&state, &event, ctx),
            _ if state.receive_events_state.last_contiguous_sequence_received.is_some() => {
                receive_sequenced(state, event, ctx)
            }
            _ => {
                warn!(key = ctx.key, "Init received for session opened locally");
                into_error(
                    state,
                    ErrorEnvelope::new(
                        error_types::DUPLICATE_INIT,
                        format!("both sides opened session {}", ctx.key),
                    ),
                    ctx,
                )
            }
        },
    }
}
