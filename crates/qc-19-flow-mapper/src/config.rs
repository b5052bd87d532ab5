//! Configuration for the Flow Mapper

use serde::Deserialize;
use std::env;

/// Default grace period before a CLOSING mapper state is deleted (30 seconds).
pub const DEFAULT_CLEANUP_GRACE_PERIOD_MS: u64 = 30_000;

/// Runtime configuration for the flow mapper
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowMapperConfig {
    /// Expiry offset applied when a cleanup request carries no expiry time
    pub cleanup_grace_period_ms: u64,
}

impl Default for FlowMapperConfig {
    fn default() -> Self {
        Self {
            cleanup_grace_period_ms: DEFAULT_CLEANUP_GRACE_PERIOD_MS,
        }
    }
}

impl FlowMapperConfig {
    /// Create configuration from environment variables.
    ///
    /// - `QC_MAPPER_CLEANUP_GRACE_MS` (default: 30000)
    pub fn from_env() -> Self {
        let cleanup_grace_period_ms = env::var("QC_MAPPER_CLEANUP_GRACE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CLEANUP_GRACE_PERIOD_MS);
        Self {
            cleanup_grace_period_ms,
        }
    }
}
