//! Domain module for the Session Manager
//!
//! ## Core Modules
//! - dedup: pure sequencing decision per incoming event
//! - state: the persisted per-session record
//! - processors: one handler per event kind and direction
//! - housekeeping: resend window and session timeout

pub mod dedup;
pub mod housekeeping;
pub mod processors;
pub mod state;

pub use dedup::{next_deliverable, SequencingState};
pub use housekeeping::{check_timeout, messages_to_send};
pub use processors::{process_event, FlowDelivery, ProcessorContext, ProcessorOutcome};
pub use state::{ReceiveEventsState, SendEventsState, SessionState, SessionStatus};
