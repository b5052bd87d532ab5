//! Errors from the partitioned log and keyed state store.
//!
//! All of these are transient from the session layer's point of view: the
//! caller retries at the consumption-offset level.

use thiserror::Error;

/// Errors from log and store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The log or store is temporarily unreachable.
    #[error("{component} unavailable: {reason}")]
    Unavailable {
        component: &'static str,
        reason: String,
    },

    /// A state record could not be encoded or decoded.
    #[error("Serialization error for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    /// The log was shut down.
    #[error("Log closed")]
    Closed,
}

impl BusError {
    /// Whether retrying the same operation later can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type for log and store operations.
pub type BusResult<T> = Result<T, BusError>;
