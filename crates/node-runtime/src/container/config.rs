//! # Node Configuration
//!
//! Unified configuration for both services and the runtime around them.
//! Every value has a default and an environment override.

use qc_18_session_manager::SessionManagerConfig;
use qc_19_flow_mapper::FlowMapperConfig;
use quantum_telemetry::TelemetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default interval between housekeeping sweeps (1 second).
pub const DEFAULT_HOUSEKEEPING_INTERVAL_MS: u64 = 1_000;

/// Default wait before a batch that failed on transient I/O is retried.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default upper bound on records handed to a service at once.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Session manager (qc-18) configuration.
    pub session: SessionManagerConfig,
    /// Flow mapper (qc-19) configuration.
    pub mapper: FlowMapperConfig,
    /// Logging configuration.
    pub telemetry: TelemetryConfig,
    /// Pipelines and partitioning.
    pub runtime: RuntimeConfig,
}

impl NodeConfig {
    /// Load every section from the environment.
    pub fn from_env() -> Self {
        Self {
            session: SessionManagerConfig::from_env(),
            mapper: FlowMapperConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
            runtime: RuntimeConfig::from_env(),
        }
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let runtime = &self.runtime;
        if runtime.partition_count == 0 {
            return Err(ConfigError::Invalid {
                field: "partition_count",
                reason: "must be at least 1".into(),
            });
        }
        if runtime.max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if runtime.housekeeping_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "housekeeping_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if runtime.housekeeping_interval_ms > self.session.message_resend_window_ms {
            warn!(
                interval_ms = runtime.housekeeping_interval_ms,
                resend_window_ms = self.session.message_resend_window_ms,
                "Housekeeping runs less often than the resend window"
            );
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Interval between resend and timeout sweeps over live sessions.
    pub housekeeping_interval_ms: u64,
    /// Wait before retrying a batch that failed on transient I/O.
    pub retry_backoff_ms: u64,
    /// Most records handed to a service in one batch.
    pub max_batch_size: usize,
    /// Partitions of the log and of both state stores.
    pub partition_count: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            housekeeping_interval_ms: DEFAULT_HOUSEKEEPING_INTERVAL_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            partition_count: shared_bus::DEFAULT_PARTITION_COUNT,
        }
    }
}

impl RuntimeConfig {
    /// # Environment Variables
    ///
    /// - `QC_HOUSEKEEPING_INTERVAL_MS`
    /// - `QC_RETRY_BACKOFF_MS`
    /// - `QC_MAX_BATCH_SIZE`
    /// - `QC_PARTITION_COUNT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            housekeeping_interval_ms: env_or(
                "QC_HOUSEKEEPING_INTERVAL_MS",
                defaults.housekeeping_interval_ms,
            ),
            retry_backoff_ms: env_or("QC_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            max_batch_size: env_or("QC_MAX_BATCH_SIZE", defaults.max_batch_size),
            partition_count: env_or("QC_PARTITION_COUNT", defaults.partition_count),
        }
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn env_or<T: FromStr + Copy>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var, value = %raw, "Ignoring unparsable value");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(NodeConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let mut config = NodeConfig::default();
        config.runtime.partition_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "partition_count",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut config = NodeConfig::default();
        config.runtime.max_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        env::set_var("QC_TEST_NODE_BATCH", "lots");
        assert_eq!(env_or("QC_TEST_NODE_BATCH", 7usize), 7);
        env::set_var("QC_TEST_NODE_BATCH", "12");
        assert_eq!(env_or("QC_TEST_NODE_BATCH", 7usize), 12);
        env::remove_var("QC_TEST_NODE_BATCH");
    }
}
