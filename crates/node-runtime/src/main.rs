//! # Quantum-Chain Session Node
//!
//! Runs the session manager and the flow mapper against one partitioned log.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize logging
//! 3. Start pipelines and housekeeping
//! 4. Log flow deliveries until Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use node_runtime::adapters::FlowNotification;
use node_runtime::{NodeConfig, NodeRuntime};
use qc_18_session_manager::FlowDelivery;
use shared_types::SystemTimeSource;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env();
    quantum_telemetry::init_logging(&config.telemetry).context("Failed to initialize logging")?;

    let (runtime, mut inbox) = NodeRuntime::new(config, Arc::new(SystemTimeSource));
    runtime.start().await?;

    // No flow engine is embedded: deliveries are only logged.
    let drain = tokio::spawn(async move {
        while let Some(FlowNotification { flow_id, delivery }) = inbox.recv().await {
            match delivery {
                FlowDelivery::Payload { sequence_num, payload } => {
                    info!(flow_id = %flow_id, sequence_num, bytes = payload.len(), "Payload delivered");
                }
                FlowDelivery::Closed => info!(flow_id = %flow_id, "Session closed by counterparty"),
                FlowDelivery::Error(error) => info!(flow_id = %flow_id, %error, "Session failed"),
            }
        }
    });

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    drain.abort();
    Ok(())
}
