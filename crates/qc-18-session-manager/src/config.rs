//! Configuration for the Session Manager

use serde::Deserialize;
use std::env;

/// Default validity window for the first message of a session (5 minutes).
pub const DEFAULT_VALID_WINDOW_MS: u64 = 300_000;

/// Default time a CLOSING session is kept before cleanup (30 seconds).
pub const DEFAULT_CLEANUP_GRACE_PERIOD_MS: u64 = 30_000;

/// Default time after which an unacknowledged event is resent (5 seconds).
pub const DEFAULT_MESSAGE_RESEND_WINDOW_MS: u64 = 5_000;

/// Default time without counterparty traffic before a session errors (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 1_800_000;

/// Runtime configuration for the session manager
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// A first message older than this is discarded instead of opening a session
    pub valid_window_ms: u64,

    /// Added to `now` to compute the expiry of a CLOSING session
    pub cleanup_grace_period_ms: u64,

    /// Minimum age of an outbox entry before it is resent
    pub message_resend_window_ms: u64,

    /// Maximum silence from the counterparty before the session errors
    pub session_timeout_ms: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            valid_window_ms: DEFAULT_VALID_WINDOW_MS,
            cleanup_grace_period_ms: DEFAULT_CLEANUP_GRACE_PERIOD_MS,
            message_resend_window_ms: DEFAULT_MESSAGE_RESEND_WINDOW_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }
}

impl SessionManagerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_SESSION_VALID_WINDOW_MS` (default: 300000)
    /// - `QC_SESSION_CLEANUP_GRACE_MS` (default: 30000)
    /// - `QC_SESSION_RESEND_WINDOW_MS` (default: 5000)
    /// - `QC_SESSION_TIMEOUT_MS` (default: 1800000)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self {
            valid_window_ms: env_millis("QC_SESSION_VALID_WINDOW_MS", DEFAULT_VALID_WINDOW_MS),
            cleanup_grace_period_ms: env_millis(
                "QC_SESSION_CLEANUP_GRACE_MS",
                DEFAULT_CLEANUP_GRACE_PERIOD_MS,
            ),
            message_resend_window_ms: env_millis(
                "QC_SESSION_RESEND_WINDOW_MS",
                DEFAULT_MESSAGE_RESEND_WINDOW_MS,
            ),
            session_timeout_ms: env_millis("QC_SESSION_TIMEOUT_MS", DEFAULT_SESSION_TIMEOUT_MS),
        }
    }
}

fn env_millis(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
