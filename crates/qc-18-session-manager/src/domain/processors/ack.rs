//! Ack processor (receive side).

use super::{close, stray, ProcessorContext, ProcessorOutcome};
use crate::domain::state::{SessionState, SessionStatus};
use shared_types::{error_types, ErrorEnvelope, SessionEvent, SessionPayload, StateLookup};
use tracing::{debug, warn};

/// Ack from the counterparty.
///
/// Retires every outbox entry numbered at or below `received_sequence_num`
/// that the counterparty does not also report as out of order. Unsequenced
/// entries (errors) are never retired by an Ack.
pub fn receive(
    lookup: StateLookup<SessionState>,
    event: &SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let SessionPayload::Ack {
        received_sequence_num,
        out_of_order_sequence_nums,
    } = &event.payload
    else {
        return ProcessorOutcome::unchanged();
    };

    let mut state = match lookup {
        StateLookup::Known(state) => state,
        StateLookup::Unknown => {
            warn!(
                key = ctx.key,
                received_sequence_num, "Received ack for unknown session"
            );
            return stray(
                ErrorEnvelope::new(
                    error_types::ACK_NULL_STATE,
                    format!("ack received for unknown session {}", ctx.key),
                ),
                ctx,
            );
        }
        StateLookup::Tombstoned => {
            debug!(key = ctx.key, "Discarding ack for retired session");
            return ProcessorOutcome::unchanged();
        }
    };

    if state.status.is_terminal() {
        debug!(key = ctx.key, status = state.status.as_str(), "Ignoring ack");
        return ProcessorOutcome::unchanged();
    }

    let send = &mut state.send_events_state;
    let before = send.undelivered_messages.len();
    send.undelivered_messages.retain(|e| match e.sequence_num {
        Some(seq) => seq > *received_sequence_num || out_of_order_sequence_nums.contains(&seq),
        None => true,
    });
    debug!(
        key = ctx.key,
        received_sequence_num,
        retired = before - send.undelivered_messages.len(),
        "Ack processed"
    );

    state.receive_events_state.last_processed_timestamp = ctx.now;
    if state.status == SessionStatus::Created && *received_sequence_num >= 1 {
        state.status = SessionStatus::Confirmed;
    }

    let mut outcome = ProcessorOutcome::unchanged();
    close::try_enter_closing(&mut state, ctx);
    close::try_complete(&mut state, ctx, &mut outcome);
    outcome.state = Some(state);
    outcome
}
