//! Close processors.
//!
//! A Close from either side is only a request until everything we numbered
//! before our own Close has been acknowledged. Then the session is CLOSING
//! and gets its expiry. It becomes CLOSED once the peer's Close has been
//! delivered and our own Close has been acknowledged, provided that happens
//! before the expiry; a handshake finishing later fails the session.
//! CLOSED never regresses.

use super::data::assign_next_sequence;
use super::{fail, stray, FlowDelivery, ProcessorContext, ProcessorOutcome};
use crate::domain::state::{SessionState, SessionStatus};
use shared_types::{error_types, ErrorEnvelope, SessionEvent, StateLookup};
use tracing::{debug, info, warn};

/// Close from the local flow.
pub fn send(
    lookup: StateLookup<SessionState>,
    event: SessionEvent,
    ctx: &ProcessorContext<'_>,
) -> ProcessorOutcome {
    let mut state = match lookup {
        StateLookup::Known(state) => state,
        StateLookup::Unknown => {
            warn!(key = ctx.key, "Flow closed unknown session");
            return stray(
                ErrorEnvelope::new(
                    error_types::SEND_NULL_STATE,
                    format!("cannot close, no session state for {}", ctx.key),
                ),
                ctx,
            );
        }
        StateLookup::Tombstoned => {
            return ProcessorOutcome::rejected(ErrorEnvelope::new(
                error_types::SEND_NULL_STATE,
                format!("cannot close, session {} is retired", ctx.key),
            ));
        }
    };

    if state.status.is_terminal() {
        return ProcessorOutcome::rejected(ErrorEnvelope::new(
            error_types::PROTOCOL_VIOLATION,
            format!(
                "cannot close session {} in state {}",
                ctx.key,
                state.status.as_str()
            ),
        ));
    }
    if state.send_events_state.close_sequence_num.is_some() {
        debug!(key = ctx.key, "Close already sent");
        return ProcessorOutcome::unchanged();
    }

    let close = assign_next_sequence(&mut state, &event, ctx);
    state.send_events_state.close_sequence_num = close.sequence_num;
    if !try_enter_closing(&mut state, ctx) {
        debug!(
            key = ctx.key,
            sequence_num = ?close.sequence_num,
            "Close queued behind unacknowledged data"
        );
    }

    ProcessorOutcome {
        outbound: vec![close],
        ..ProcessorOutcome::with_state(state)
    }
}

/// The counterparty's Close has become deliverable.
pub(crate) fn on_close_delivered(
    state: &mut SessionState,
    ctx: &ProcessorContext<'_>,
    outcome: &mut ProcessorOutcome,
) {
    state.receive_events_state.close_received = true;
    outcome.deliveries.push(FlowDelivery::Closed);
    try_enter_closing(state, ctx);
    try_complete(state, ctx, outcome);
}

/// Enter CLOSING once a Close is in play and our earlier data is acknowledged.
///
/// Returns true if the session is CLOSING afterwards.
pub(crate) fn try_enter_closing(state: &mut SessionState, ctx: &ProcessorContext<'_>) -> bool {
    if state.status == SessionStatus::Closing {
        return true;
    }
    let close_in_play = state.receive_events_state.close_received
        || state.send_events_state.close_sequence_num.is_some();
    if !matches!(state.status, SessionStatus::Created | SessionStatus::Confirmed)
        || !close_in_play
        || state.send_events_state.has_pending_data()
    {
        return false;
    }
    state.status = SessionStatus::Closing;
    state.expiry_timestamp = Some(ctx.now + ctx.config.cleanup_grace_period_ms);
    debug!(key = ctx.key, expiry = ?state.expiry_timestamp, "Session closing");
    true
}

/// CLOSING → CLOSED once both Closes are done. Requests cleanup at expiry.
pub(crate) fn try_complete(
    state: &mut SessionState,
    ctx: &ProcessorContext<'_>,
    outcome: &mut ProcessorOutcome,
) {
    if state.status != SessionStatus::Closing
        || !state.receive_events_state.close_received
        || !state.send_events_state.close_acknowledged()
    {
        return;
    }
    let expiry = state.expiry_timestamp.unwrap_or(ctx.now);
    if ctx.now > expiry {
        warn!(key = ctx.key, expiry, "Close handshake finished after expiry");
        fail(
            state,
            ErrorEnvelope::new(
                error_types::CLOSE_EXPIRED,
                format!("close handshake finished {}ms after expiry", ctx.now - expiry),
            ),
            ctx,
            outcome,
        );
        return;
    }
    state.status = SessionStatus::Closed;
    outcome.cleanup_at = Some(expiry);
    info!(key = ctx.key, expiry, "Session closed");
}
