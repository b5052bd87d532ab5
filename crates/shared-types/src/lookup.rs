//! # State Lookup
//!
//! Result of reading a keyed state record. "Never seen" and "deleted" are
//! distinct: a stray event for a tombstoned session must not be mistaken for
//! the first event of a new one.

use serde::{Deserialize, Serialize};

/// Three-way outcome of a keyed state read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateLookup<S> {
    /// A live record exists.
    Known(S),
    /// No record has ever been written under this key.
    Unknown,
    /// A record existed and was deleted.
    Tombstoned,
}

impl<S> StateLookup<S> {
    /// Borrow the live state, if any.
    #[must_use]
    pub fn known(&self) -> Option<&S> {
        match self {
            Self::Known(state) => Some(state),
            Self::Unknown | Self::Tombstoned => None,
        }
    }

    /// Take the live state, if any.
    #[must_use]
    pub fn into_known(self) -> Option<S> {
        match self {
            Self::Known(state) => Some(state),
            Self::Unknown | Self::Tombstoned => None,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    #[must_use]
    pub fn is_tombstoned(&self) -> bool {
        matches!(self, Self::Tombstoned)
    }

    /// Map the live state, keeping absence untouched.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> StateLookup<T> {
        match self {
            Self::Known(state) => StateLookup::Known(f(state)),
            Self::Unknown => StateLookup::Unknown,
            Self::Tombstoned => StateLookup::Tombstoned,
        }
    }
}

impl<S> From<Option<S>> for StateLookup<S> {
    fn from(value: Option<S>) -> Self {
        match value {
            Some(state) => Self::Known(state),
            None => Self::Unknown,
        }
    }
}
