//! Driving Ports (API - Inbound)

use crate::domain::FlowMapperState;
use crate::error::FlowMapperResult;
use async_trait::async_trait;
use shared_types::{Record, StateLookup};

/// Primary Flow Mapper API
///
/// Consumes records from the flow mapper event topic. Partition callbacks
/// are exposed through [`shared_bus::RebalanceListener`].
#[async_trait]
pub trait FlowMapperApi: Send + Sync {
    /// Process a batch in order and return every record published for it.
    ///
    /// Records that do not carry a `FlowMapperEvent` are skipped.
    ///
    /// # Errors
    /// * Store or publish failures (transient, retry the batch)
    /// * Invariant violations (fatal)
    async fn on_next(&self, records: Vec<Record>) -> FlowMapperResult<Vec<Record>>;

    /// Read the mapper state for `key`.
    async fn get_state(&self, key: &str) -> FlowMapperResult<StateLookup<FlowMapperState>>;
}
