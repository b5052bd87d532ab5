//! # Session Manager Metrics
//!
//! Prometheus metrics for the session manager.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-18-session-manager = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `session_payloads_delivered_total` - Payloads handed to the flow engine
//! - `session_duplicates_dropped_total` - Sequenced events already delivered
//! - `session_errors_total` - Sessions moved to ERROR (by reason)
//! - `session_acks_processed_total` - Acks received from counterparties
//! - `session_events_resent_total` - Outbox entries resent

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Payloads delivered to flows
    pub static ref PAYLOADS_DELIVERED: IntCounter = register_int_counter!(
        "session_payloads_delivered_total",
        "Total number of payloads delivered to the flow engine"
    )
    .expect("Failed to create PAYLOADS_DELIVERED metric");

    /// Duplicates dropped by the dedup engine
    pub static ref DUPLICATES_DROPPED: IntCounter = register_int_counter!(
        "session_duplicates_dropped_total",
        "Total number of sequenced events dropped as already delivered"
    )
    .expect("Failed to create DUPLICATES_DROPPED metric");

    /// Sessions errored, labeled by error type
    pub static ref SESSIONS_ERRORED: IntCounterVec = register_int_counter_vec!(
        "session_errors_total",
        "Total number of sessions moved to ERROR",
        &["error_type"]
    )
    .expect("Failed to create SESSIONS_ERRORED metric");

    /// Acks processed
    pub static ref ACKS_PROCESSED: IntCounter = register_int_counter!(
        "session_acks_processed_total",
        "Total number of acks received from counterparties"
    )
    .expect("Failed to create ACKS_PROCESSED metric");

    /// Events resent
    pub static ref EVENTS_RESENT: IntCounter = register_int_counter!(
        "session_events_resent_total",
        "Total number of outbox entries resent"
    )
    .expect("Failed to create EVENTS_RESENT metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_payloads_delivered(count: u64) {
    PAYLOADS_DELIVERED.inc_by(count);
}

#[cfg(feature = "metrics")]
pub fn record_duplicate_dropped() {
    DUPLICATES_DROPPED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_session_errored(error_type: &str) {
    SESSIONS_ERRORED.with_label_values(&[error_type]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_ack_processed() {
    ACKS_PROCESSED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_events_resent(count: u64) {
    EVENTS_RESENT.inc_by(count);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_payloads_delivered(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_duplicate_dropped() {}

#[cfg(not(feature = "metrics"))]
pub fn record_session_errored(_error_type: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_ack_processed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_events_resent(_count: u64) {}
