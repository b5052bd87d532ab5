//! # Record Factory
//!
//! Builds the records the mapper publishes. Direction is derived from the
//! session id convention, never stored:
//!
//! ```text
//! key "abc", event.session_id "abc-INITIATED"  →  inbound   →  [flow.event] keyed by flow id
//! key "abc", event.session_id "abc"            →  outbound  →  [p2p.out]    keyed by "abc-INITIATED"
//! ```

use shared_types::{
    counterparty_session_id, ErrorEnvelope, FlowEvent, FlowId, FlowMapperEvent, MessageDirection,
    Record, RecordValue, SessionEvent, Timestamp, Topic,
};

/// Route `event`, stored under `key`, to its destination.
///
/// Returns `None` when the direction cannot be derived or an inbound event
/// has no flow to go to.
#[must_use]
pub fn forward_event(key: &str, event: &SessionEvent, flow_id: Option<&FlowId>) -> Option<Record> {
    match MessageDirection::derive(key, &event.session_id)? {
        MessageDirection::Inbound => {
            let flow_id = flow_id?;
            Some(Record::new(
                Topic::FlowEvent,
                flow_id.clone(),
                RecordValue::FlowEvent(FlowEvent {
                    flow_id: flow_id.clone(),
                    event: event.clone(),
                }),
            ))
        }
        MessageDirection::Outbound => Some(Record::new(
            Topic::P2POut,
            counterparty_session_id(key),
            RecordValue::Session(event.clone()),
        )),
    }
}

/// Route an error in place of `event`, to the same destination.
#[must_use]
pub fn forward_error(
    key: &str,
    event: &SessionEvent,
    error: ErrorEnvelope,
    now: Timestamp,
    flow_id: Option<&FlowId>,
) -> Option<Record> {
    let error_event = SessionEvent::error(event.session_id.clone(), now, error);
    forward_event(key, &error_event, flow_id)
}

/// Reply to the sender of `event` with an error, without resolving a flow.
#[must_use]
pub fn send_back_error(key: &str, event: &SessionEvent, error: ErrorEnvelope, now: Timestamp) -> Record {
    Record::new(
        Topic::P2POut,
        event.session_id.clone(),
        RecordValue::Session(SessionEvent::error(key, now, error)),
    )
}

/// The record that deletes the mapper state for `key`.
#[must_use]
pub fn create_cleanup_record(key: &str) -> Record {
    Record::mapper_event(key, FlowMapperEvent::ExecuteCleanup)
}
