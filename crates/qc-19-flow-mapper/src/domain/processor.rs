//! # Mapper Event Processor
//!
//! One pure step per `FlowMapperEvent`: `(lookup, event, now) -> (state change, records)`.
//!
//! ```text
//! Session          ──→ forward, open on Init, error back for strays
//! ScheduleCleanup  ──→ OPEN → CLOSING(expiry)
//! ExecuteCleanup   ──→ CLOSING → deleted
//! ```

use super::record_factory::{forward_error, forward_event, send_back_error};
use super::state::{FlowMapperState, FlowMapperStatus};
use crate::config::FlowMapperConfig;
use shared_types::{
    error_types, ErrorEnvelope, EventKind, FlowId, FlowMapperEvent, MessageDirection, Record,
    SessionEvent, StateLookup, Timestamp,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inputs shared by every mapper step.
#[derive(Clone, Copy, Debug)]
pub struct MapperContext<'a> {
    /// Local session id the record is keyed by.
    pub key: &'a str,
    pub now: Timestamp,
    pub config: &'a FlowMapperConfig,
}

/// What to do with the stored mapper state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateChange {
    Unchanged,
    Update(FlowMapperState),
    /// Tombstone the key.
    Delete,
}

/// Result of one mapper step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapperOutcome {
    pub change: StateChange,
    /// Records to publish, in order.
    pub records: Vec<Record>,
    /// Number of session events routed to a flow or the transport.
    pub forwarded: u64,
    /// The event had no usable mapper state.
    pub stray: bool,
}

impl MapperOutcome {
    fn unchanged() -> Self {
        Self {
            change: StateChange::Unchanged,
            records: Vec::new(),
            forwarded: 0,
            stray: false,
        }
    }

    fn stray(records: Vec<Record>) -> Self {
        Self {
            records,
            stray: true,
            ..Self::unchanged()
        }
    }

    fn forwarded(change: StateChange, record: Record) -> Self {
        Self {
            change,
            records: vec![record],
            forwarded: 1,
            stray: false,
        }
    }
}

/// Apply one mapper event to the state stored under `ctx.key`.
pub fn process_mapper_event(
    lookup: StateLookup<FlowMapperState>,
    event: FlowMapperEvent,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    match event {
        FlowMapperEvent::Session { event, flow_id } => {
            on_session_event(lookup, &event, flow_id, ctx)
        }
        FlowMapperEvent::ScheduleCleanup { expiry_time } => {
            on_schedule_cleanup(lookup, expiry_time, ctx)
        }
        FlowMapperEvent::ExecuteCleanup => on_execute_cleanup(lookup, ctx),
    }
}

fn on_session_event(
    lookup: StateLookup<FlowMapperState>,
    event: &SessionEvent,
    bound_flow: Option<FlowId>,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    let Some(direction) = MessageDirection::derive(ctx.key, &event.session_id) else {
        warn!(
            key = ctx.key,
            session_id = %event.session_id,
            "Cannot derive direction, discarding event"
        );
        return MapperOutcome::stray(Vec::new());
    };

    match lookup {
        StateLookup::Known(state) => on_known_session(state, direction, event, bound_flow, ctx),
        StateLookup::Unknown => on_unknown_session(direction, event, bound_flow, ctx),
        StateLookup::Tombstoned => {
            debug!(key = ctx.key, kind = event.kind().as_str(), "Discarding event for cleaned up session");
            MapperOutcome::stray(Vec::new())
        }
    }
}

fn on_unknown_session(
    direction: MessageDirection,
    event: &SessionEvent,
    bound_flow: Option<FlowId>,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    match (direction, event.kind()) {
        (MessageDirection::Inbound, EventKind::Init) => {
            let flow_id = Uuid::new_v4().to_string();
            info!(key = ctx.key, flow_id = %flow_id, "Counterparty opened session, starting flow");
            let state = FlowMapperState::open(Some(flow_id));
            open_and_forward(state, event, ctx)
        }
        (MessageDirection::Outbound, EventKind::Init) => {
            if bound_flow.is_none() {
                warn!(key = ctx.key, "Outbound Init carries no flow id");
            }
            open_and_forward(FlowMapperState::open(bound_flow), event, ctx)
        }
        (MessageDirection::Outbound, EventKind::Error) => match forward_event(ctx.key, event, None) {
            Some(record) => MapperOutcome::forwarded(StateChange::Unchanged, record),
            None => MapperOutcome::stray(Vec::new()),
        },
        (MessageDirection::Inbound, EventKind::Error) => {
            warn!(key = ctx.key, "Discarding counterparty error for unknown session");
            MapperOutcome::stray(Vec::new())
        }
        (MessageDirection::Inbound, kind) => {
            warn!(key = ctx.key, kind = kind.as_str(), "Event for unknown session, erroring back");
            MapperOutcome::stray(vec![send_back_error(
                ctx.key,
                event,
                ErrorEnvelope::new(
                    error_types::MAPPER_UNKNOWN_SESSION,
                    format!("no flow mapper state for {}", ctx.key),
                ),
                ctx.now,
            )])
        }
        (MessageDirection::Outbound, kind) => {
            warn!(key = ctx.key, kind = kind.as_str(), "Flow sent event for unknown session, discarding");
            MapperOutcome::stray(Vec::new())
        }
    }
}

fn open_and_forward(
    state: FlowMapperState,
    event: &SessionEvent,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    match forward_event(ctx.key, event, state.flow_id.as_ref()) {
        Some(record) => MapperOutcome::forwarded(StateChange::Update(state), record),
        None => MapperOutcome {
            change: StateChange::Update(state),
            ..MapperOutcome::unchanged()
        },
    }
}

fn on_known_session(
    mut state: FlowMapperState,
    direction: MessageDirection,
    event: &SessionEvent,
    bound_flow: Option<FlowId>,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    if state.is_expired(ctx.now) && event.kind() != EventKind::Error {
        warn!(key = ctx.key, kind = event.kind().as_str(), "Event for expired session");
        let record = forward_error(
            ctx.key,
            event,
            ErrorEnvelope::new(error_types::MAPPER_SESSION_EXPIRED, "session expired"),
            ctx.now,
            state.flow_id.as_ref(),
        );
        return match record {
            Some(record) => MapperOutcome::forwarded(StateChange::Unchanged, record),
            None => MapperOutcome::stray(Vec::new()),
        };
    }

    let mut change = StateChange::Unchanged;
    if state.flow_id.is_none() && bound_flow.is_some() && direction == MessageDirection::Outbound {
        state.flow_id = bound_flow;
        change = StateChange::Update(state.clone());
    }

    if let Some(record) = forward_event(ctx.key, event, state.flow_id.as_ref()) {
        debug!(key = ctx.key, topic = %record.topic, kind = event.kind().as_str(), "Forwarding session event");
        return MapperOutcome::forwarded(change, record);
    }

    // Inbound, but no flow is bound to the session.
    if event.kind() == EventKind::Error {
        warn!(key = ctx.key, "Discarding counterparty error, no flow bound");
        return MapperOutcome {
            change,
            ..MapperOutcome::stray(Vec::new())
        };
    }
    warn!(key = ctx.key, "No flow bound to session, erroring back");
    MapperOutcome {
        change,
        ..MapperOutcome::stray(vec![send_back_error(
            ctx.key,
            event,
            ErrorEnvelope::new(
                error_types::MAPPER_UNKNOWN_SESSION,
                format!("no flow bound to {}", ctx.key),
            ),
            ctx.now,
        )])
    }
}

fn on_schedule_cleanup(
    lookup: StateLookup<FlowMapperState>,
    expiry_time: Option<Timestamp>,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    let StateLookup::Known(mut state) = lookup else {
        debug!(key = ctx.key, "Cleanup requested for session with no mapper state");
        return MapperOutcome::unchanged();
    };

    let requested =
        expiry_time.unwrap_or_else(|| ctx.now.saturating_add(ctx.config.cleanup_grace_period_ms));
    // A CLOSING state only ever moves its expiry earlier.
    let expiry = match state.cleanup_due() {
        Some(current) => current.min(requested),
        None => requested,
    };
    if state.cleanup_due() == Some(expiry) {
        return MapperOutcome::unchanged();
    }

    debug!(key = ctx.key, expiry, "Session mapper state closing");
    state.status = FlowMapperStatus::Closing;
    state.expiry_time = Some(expiry);
    MapperOutcome {
        change: StateChange::Update(state),
        ..MapperOutcome::unchanged()
    }
}

fn on_execute_cleanup(
    lookup: StateLookup<FlowMapperState>,
    ctx: &MapperContext<'_>,
) -> MapperOutcome {
    match lookup {
        StateLookup::Known(state) if state.is_closing() => {
            info!(key = ctx.key, flow_id = ?state.flow_id, "Cleaning up session mapper state");
            MapperOutcome {
                change: StateChange::Delete,
                ..MapperOutcome::unchanged()
            }
        }
        StateLookup::Known(state) => {
            debug!(key = ctx.key, status = state.status.as_str(), "Ignoring cleanup for live session");
            MapperOutcome::unchanged()
        }
        StateLookup::Unknown | StateLookup::Tombstoned => MapperOutcome::unchanged(),
    }
}
