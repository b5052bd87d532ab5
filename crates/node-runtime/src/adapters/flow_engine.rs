//! Flow engine adapter backed by an unbounded channel.
//!
//! The node does not run flows itself. Deliveries are queued for whatever
//! embeds the node, in the order the session manager produced them.

use async_trait::async_trait;
use qc_18_session_manager::{FlowDelivery, FlowEngine, SessionManagerError, SessionManagerResult};
use shared_types::FlowId;
use tokio::sync::mpsc;
use tracing::debug;

/// One notification for a local flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowNotification {
    pub flow_id: FlowId,
    pub delivery: FlowDelivery,
}

/// Receiving end of [`ChannelFlowEngine`].
pub type FlowInbox = mpsc::UnboundedReceiver<FlowNotification>;

/// [`FlowEngine`] that queues every delivery on a channel.
#[derive(Clone)]
pub struct ChannelFlowEngine {
    sender: mpsc::UnboundedSender<FlowNotification>,
}

impl ChannelFlowEngine {
    /// Create the engine and the inbox it feeds.
    pub fn channel() -> (Self, FlowInbox) {
        let (sender, inbox) = mpsc::unbounded_channel();
        (Self { sender }, inbox)
    }
}

#[async_trait]
impl FlowEngine for ChannelFlowEngine {
    async fn deliver(&self, flow_id: &FlowId, delivery: FlowDelivery) -> SessionManagerResult<()> {
        debug!(flow_id = %flow_id, "Queueing flow delivery");
        self.sender
            .send(FlowNotification {
                flow_id: flow_id.clone(),
                delivery,
            })
            .map_err(|_| SessionManagerError::Delivery {
                flow_id: flow_id.clone(),
                reason: "flow inbox closed".to_string(),
            })
    }
}
