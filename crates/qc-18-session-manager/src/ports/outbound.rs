//! Driven Ports (SPI - Outbound)

use crate::domain::{FlowDelivery, SessionState};
use crate::error::SessionManagerResult;
use async_trait::async_trait;
use shared_bus::KeyedStateStore;
use shared_types::FlowId;

/// The local workflow engine.
///
/// Delivery is fire-and-forget from the session manager's point of view:
/// retrying a failed delivery is the engine's responsibility.
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// Hand one in-order, deduplicated notification to `flow_id`.
    async fn deliver(&self, flow_id: &FlowId, delivery: FlowDelivery) -> SessionManagerResult<()>;
}

/// Keyed store of session states.
pub trait SessionStateStore: KeyedStateStore<SessionState> {}

impl<T> SessionStateStore for T where T: KeyedStateStore<SessionState> + ?Sized {}
