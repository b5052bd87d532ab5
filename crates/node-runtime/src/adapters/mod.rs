//! # Adapter Implementations
//!
//! Concrete implementations of the outbound ports the services need but the
//! shared infrastructure does not provide.
//!
//! ```text
//! SessionManagerService ──FlowEngine──→ ChannelFlowEngine ──mpsc──→ FlowInbox
//! ```

pub mod flow_engine;

pub use flow_engine::{ChannelFlowEngine, FlowInbox, FlowNotification};
