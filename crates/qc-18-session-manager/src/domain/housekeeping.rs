//! # Resend and Timeout
//!
//! Time-driven work on a session, run after every processed event and on
//! explicit housekeeping passes.

use super::processors::{into_error, ProcessorContext, ProcessorOutcome};
use super::state::{SessionState, SessionStatus};
use shared_types::{error_types, ErrorEnvelope, SessionEvent};
use tracing::warn;

/// Outbox entries due for (re)transmission.
///
/// A sequenced entry is due once `message_resend_window_ms` has passed since
/// it was last sent. Due entries are restamped with `now` in `state`.
/// Terminal sessions resend nothing.
pub fn messages_to_send(state: &mut SessionState, ctx: &ProcessorContext<'_>) -> Vec<SessionEvent> {
    if state.status.is_terminal() {
        return Vec::new();
    }
    let window = ctx.config.message_resend_window_ms;
    let mut due = Vec::new();
    for entry in &mut state.send_events_state.undelivered_messages {
        if entry.sequence_num.is_some() && ctx.now.saturating_sub(entry.timestamp) >= window {
            *entry = entry.with_timestamp(ctx.now);
            due.push(entry.clone());
        }
    }
    due
}

/// Fail a live session that has heard nothing from its counterparty for
/// `session_timeout_ms`, or a CLOSING session past its expiry.
pub fn check_timeout(state: &SessionState, ctx: &ProcessorContext<'_>) -> Option<ProcessorOutcome> {
    if state.status.is_terminal() {
        return None;
    }
    if let (SessionStatus::Closing, Some(expiry)) = (state.status, state.expiry_timestamp) {
        if ctx.now > expiry {
            warn!(key = ctx.key, expiry, "Close handshake expired");
            return Some(into_error(
                state.clone(),
                ErrorEnvelope::new(
                    error_types::CLOSE_EXPIRED,
                    format!("close handshake not finished by {expiry}"),
                ),
                ctx,
            ));
        }
    }
    let silent_for = ctx
        .now
        .saturating_sub(state.receive_events_state.last_processed_timestamp);
    if silent_for <= ctx.config.session_timeout_ms {
        return None;
    }
    warn!(key = ctx.key, silent_for, "Session timed out");
    Some(into_error(
        state.clone(),
        ErrorEnvelope::new(
            error_types::SESSION_TIMEOUT,
            format!("no message from counterparty for {silent_for}ms"),
        ),
        ctx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::processors::test_support::*;
    use crate::domain::processors::FlowDelivery;

    fn with_sent(timestamps: &[u64]) -> SessionState {
        let mut state = confirmed(None);
        for (i, ts) in timestamps.iter().enumerate() {
            state.send_events_state.undelivered_messages.push(
                SessionEvent::data(KEY, *ts, vec![]).with_sequence_num(Some(i as u64 + 1)),
            );
        }
        state
    }

    #[test]
    fn test_only_entries_past_window_are_resent() {
        let config = config();
        let mut state = with_sent(&[NOW - 600, NOW - 100]);
        let due = messages_to_send(&mut state, &ctx(&config));

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].sequence_num, Some(1));
        assert_eq!(due[0].timestamp, NOW);
        assert_eq!(state.send_events_state.undelivered_messages[0].timestamp, NOW);
        assert_eq!(state.send_events_state.undelivered_messages[1].timestamp, NOW - 100);
    }

    #[test]
    fn test_resent_entry_waits_a_full_window_again() {
        let config = config();
        let mut state = with_sent(&[NOW - 600]);
        assert_eq!(messages_to_send(&mut state, &ctx(&config)).len(), 1);
        assert!(messages_to_send(&mut state, &ctx(&config)).is_empty());
    }

    #[test]
    fn test_terminal_sessions_resend_nothing() {
        let config = config();
        let mut state = with_sent(&[0]);
        state.status = SessionStatus::Error;
        assert!(messages_to_send(&mut state, &ctx(&config)).is_empty());
    }

    #[test]
    fn test_silent_session_times_out() {
        let config = config();
        let mut state = confirmed(Some(1));
        state.receive_events_state.last_processed_timestamp = NOW - config.session_timeout_ms - 1;

        let outcome = check_timeout(&state, &ctx(&config)).unwrap();
        assert_eq!(outcome.state.as_ref().unwrap().status, SessionStatus::Error);
        assert_eq!(outcome.error_type(), Some(error_types::SESSION_TIMEOUT));
        assert!(matches!(outcome.deliveries[0], FlowDelivery::Error(_)));
    }

    #[test]
    fn test_active_session_does_not_time_out() {
        let config = config();
        let state = confirmed(Some(1));
        assert!(check_timeout(&state, &ctx(&config)).is_none());
    }

    #[test]
    fn test_expired_close_handshake_fails_session() {
        let config = config();
        let mut state = confirmed(Some(1));
        state.status = SessionStatus::Closing;
        state.expiry_timestamp = Some(NOW - 1);

        let outcome = check_timeout(&state, &ctx(&config)).unwrap();
        assert_eq!(outcome.state.as_ref().unwrap().status, SessionStatus::Error);
        assert_eq!(outcome.error_type(), Some(error_types::CLOSE_EXPIRED));
        assert_eq!(outcome.cleanup_at, Some(NOW));

        state.expiry_timestamp = Some(NOW);
        assert!(check_timeout(&state, &ctx(&config)).is_none());
    }
}
