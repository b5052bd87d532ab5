//! # Shared Types Crate
//!
//! Session protocol types shared by the session manager (qc-18), the flow
//! mapper (qc-19) and the partitioned log contract (`shared-bus`).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every wire-level shape is defined here.
//! - **Tagged Payloads**: `SessionPayload` is a sum type, so every processor
//!   matches exhaustively and a new kind is a compile-time-checked change.
//! - **Derived Direction**: Direction is never carried on the wire. It is
//!   derived from the session id convention (see [`session`]).
//! - **Explicit Absence**: `StateLookup` separates "never seen" from
//!   "deleted" so stray events cannot fabricate state.

pub mod errors;
pub mod event;
pub mod lookup;
pub mod mapper;
pub mod record;
pub mod session;
pub mod time;

pub use errors::*;
pub use event::{EventKind, EventValidationError, SessionEvent, SessionPayload};
pub use lookup::StateLookup;
pub use mapper::FlowMapperEvent;
pub use record::{FlowEvent, Record, RecordValue, Topic};
pub use session::{
    counterparty_session_id, is_initiated_id, toggle_session_id, FlowId, MessageDirection,
    SessionId, INITIATED_SESSION_ID_SUFFIX,
};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};
