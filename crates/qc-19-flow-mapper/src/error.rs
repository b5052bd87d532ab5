//! Error types for the Flow Mapper

use shared_bus::BusError;
use thiserror::Error;

/// Flow Mapper errors
#[derive(Debug, Error)]
pub enum FlowMapperError {
    /// Reading or writing the mapper state store failed
    #[error("Mapper state store error: {0}")]
    Store(BusError),

    /// Publishing a routed record failed
    #[error("Publish failed: {0}")]
    Publish(BusError),

    /// The processor produced an inconsistent mapper state
    #[error("Invariant violated for key {key}: {reason}")]
    InvariantViolation { key: String, reason: String },
}

impl FlowMapperError {
    /// Whether retrying the triggering batch may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) | Self::Publish(e) => e.is_transient(),
            Self::InvariantViolation { .. } => false,
        }
    }
}

/// Result type for flow mapper operations
pub type FlowMapperResult<T> = Result<T, FlowMapperError>;
