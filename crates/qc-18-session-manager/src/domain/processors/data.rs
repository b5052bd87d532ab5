//! Data processors, and the sequenced receive path shared with Init and Close.

use super::{ack_for, close, into_error, stray, FlowDelivery, ProcessorContext, ProcessorOutcome};
use crate::domain::dedup::next_deliverable;
use crate::domain::state::{SessionState, SessionStatus};
use shared_types::{error_types, ErrorEnvelope, SessionEvent, SessionPayload, StateLookup};
use tracing::{debug, warn};

/// Data or Close from the counterparty.
pub fn receive(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let state = match lookup {
        StateLookup::Known(state) => state,
        StateLookup::Unknown => {
            let error_type = match event.payload {
                SessionPayload::Close => error_types::CLOSE_NULL_STATE,
                _ => error_types::DATA_NULL_STATE,
            };
            warn!(
                key = ctx.key,
                kind = event.kind().as_str(),
                sequence_num = ?event.sequence_num,
                "Received event for unknown session"
            );
            return stray(
                ErrorEnvelope::new(error_type, format!("no session state for {}", ctx.key)),
                ctx,
            );
        }
        StateLookup::Tombstoned => {
            debug!(key = ctx.key, "Discarding event for retired session");
            return ProcessorOutcome::unchanged();
        }
    };

    match state.status {
        SessionStatus::Error => {
            debug!(key = ctx.key, "Session in error, absorbing event");
            ProcessorOutcome::unchanged()
        }
        SessionStatus::Closed => reack_duplicate(&state, &event, ctx),
        _ => receive_sequenced(state, event, ctx),
    }
}

/// Run a sequenced counterparty event through the dedup engine.
///
/// Every delivered event is applied in order and an Ack is always queued
/// once the receive side is initialized, even if nothing new was delivered.
pub(crate) fn receive_sequenced(
    mut state: SessionState,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let Some(seq) = event.sequence_num else {
        return ProcessorOutcome::unchanged();
    };

    let before = state.receive_events_state.sequencing();
    let (sequencing, delivered) = next_deliverable(
        &before,
        seq,
        event.timestamp,
        ctx.now,
        ctx.config.valid_window_ms,
    );

    let mut outcome = ProcessorOutcome::unchanged();
    if delivered.is_empty() && before.expected_next.is_some_and(|next| seq < next) {
        debug!(key = ctx.key, sequence_num = seq, "Duplicate event dropped");
        outcome.duplicates = 1;
    }

    let receive = &mut state.receive_events_state;
    receive.last_processed_timestamp = ctx.now;
    if sequencing.out_of_order.contains(&seq) {
        receive
            .out_of_order_messages
            .entry(seq)
            .or_insert_with(|| event.clone());
    }

    let mut ready = Vec::with_capacity(delivered.len());
    for delivered_seq in &delivered {
        if *delivered_seq == seq {
            ready.push(event.clone());
        } else if let Some(buffered) = receive.out_of_order_messages.remove(delivered_seq) {
            ready.push(buffered);
        }
    }
    receive.last_contiguous_sequence_received = sequencing.last_contiguous();
    receive
        .out_of_order_messages
        .retain(|s, _| sequencing.out_of_order.contains(s));

    for delivered_event in ready {
        if let Err(error) = apply_delivered(&mut state, delivered_event, ctx, &mut outcome) {
            warn!(key = ctx.key, %error, "Protocol violation, failing session");
            let mut errored = into_error(state, error, ctx);
            errored.deliveries.splice(0..0, outcome.deliveries);
            return errored;
        }
        if state.status == SessionStatus::Error {
            outcome.state = Some(state);
            return outcome;
        }
    }

    if sequencing.is_initialized() {
        outcome.outbound.push(ack_for(&state, ctx));
    }
    outcome.state = Some(state);
    outcome
}

/// Act on one event that just became deliverable.
fn apply_delivered(
    state: &mut SessionState,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
    outcome: &mut ProcessorOutcome,
) -> Result<(), ErrorEnvelope> {
    let sequence_num = event.sequence_num.unwrap_or_default();
    match event.payload {
        SessionPayload::Init { payload } => {
            outcome.deliveries.push(FlowDelivery::Payload {
                sequence_num,
                payload,
            });
        }
        SessionPayload::Data { payload } => {
            if state.receive_events_state.close_received {
                return Err(ErrorEnvelope::new(
                    error_types::PROTOCOL_VIOLATION,
                    format!("data sequence {sequence_num} received after close"),
                ));
            }
            outcome.deliveries.push(FlowDelivery::Payload {
                sequence_num,
                payload,
            });
        }
        SessionPayload::Close => close::on_close_delivered(state, ctx, outcome),
        SessionPayload::Ack { .. } | SessionPayload::Error { .. } => {}
    }
    Ok(())
}

/// A CLOSED session still acknowledges retransmits so the peer can retire its outbox.
pub(crate) fn reack_duplicate(
    state: &SessionState,
    event: &SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let last = state.receive_events_state.last_contiguous_sequence_received;
    match event.sequence_num {
        Some(seq) if Some(seq) <= last => ProcessorOutcome {
            outbound: vec![ack_for(state, ctx)],
            duplicates: 1,
            ..ProcessorOutcome::unchanged()
        },
        _ => {
            warn!(
                key = ctx.key,
                sequence_num = ?event.sequence_num,
                "Discarding new event for closed session"
            );
            ProcessorOutcome::unchanged()
        }
    }
}

/// Data from the local flow.
pub fn send(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let mut state = match lookup {
        StateLookup::Known(state) => state,
        StateLookup::Unknown => {
            warn!(key = ctx.key, "Flow sent data on unknown session");
            return stray(
                ErrorEnvelope::new(
                    error_types::SEND_NULL_STATE,
                    format!("cannot send data, no session state for {}", ctx.key),
                ),
                ctx,
            );
        }
        StateLookup::Tombstoned => {
            return ProcessorOutcome::rejected(ErrorEnvelope::new(
                error_types::SEND_NULL_STATE,
                format!("cannot send data, session {} is retired", ctx.key),
            ));
        }
    };

    if state.status.is_terminal() || state.send_events_state.close_sequence_num.is_some() {
        return ProcessorOutcome::rejected(ErrorEnvelope::new(
            error_types::PROTOCOL_VIOLATION,
            format!(
                "cannot send data on session {} in state {}",
                ctx.key,
                state.status.as_str()
            ),
        ));
    }

    let sequenced = assign_next_sequence(&mut state, &event, ctx);
    ProcessorOutcome {
        outbound: vec![sequenced],
        ..ProcessorOutcome::with_state(state)
    }
}

/// Number `event` as the next in our stream and put it in the outbox.
pub(crate) fn assign_next_sequence(
    state: &mut SessionState,
    event: &SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> SessionEvent {
    let send = &mut state.send_events_state;
    let seq = send.next_sequence_number_to_send;
    send.next_sequence_number_to_send += 1;
    let sequenced = event.with_sequence_num(Some(seq)).with_timestamp(ctx.now);
    send.undelivered_messages.push(sequenced.clone());
    sequenced
}
