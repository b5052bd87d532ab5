//! Ports module for the Session Manager

pub mod inbound;
pub mod outbound;

pub use inbound::{SessionManagerApi, SessionRecord};
pub use outbound::{FlowEngine, SessionStateStore};
