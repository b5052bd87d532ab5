//! # Dedup/Reorder Engine
//!
//! Decides which sequence numbers become deliverable when one more event of
//! a session is observed. Pure: no I/O, no clock reads, no locking.
//!
//! ```text
//! expected_next = 3, out_of_order = {4, 5, 8, 9}
//!
//!   incoming 3 ──→ deliver [3, 4, 5], expected_next = 6, out_of_order = {8, 9}
//!   incoming 2 ──→ deliver [],        unchanged (already delivered)
//!   incoming 7 ──→ deliver [],        out_of_order = {4, 5, 7, 8, 9}
//! ```

use serde::{Deserialize, Serialize};
use shared_types::Timestamp;
use std::collections::BTreeSet;

/// Sequencing view of a session's receive side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencingState {
    /// Next sequence number to deliver. `None` until the first event is accepted.
    pub expected_next: Option<u64>,
    /// Sequence numbers held beyond the contiguous point.
    pub out_of_order: BTreeSet<u64>,
}

impl SequencingState {
    /// A session that has not accepted any event yet.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(expected_next: u64, out_of_order: impl IntoIterator<Item = u64>) -> Self {
        Self {
            expected_next: Some(expected_next),
            out_of_order: out_of_order.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.expected_next.is_some()
    }

    /// Highest sequence number delivered so far.
    #[must_use]
    pub fn last_contiguous(&self) -> Option<u64> {
        self.expected_next.map(|next| next.saturating_sub(1))
    }
}

/// Apply one observed sequence number.
///
/// Returns the new state and the sequence numbers to deliver, ascending.
/// `now - incoming_timestamp > valid_window` only matters for the first
/// event of a session: a stale opener is dropped rather than reviving it.
#[must_use]
pub fn next_deliverable(
    state: &SequencingState,
    incoming_seq: u64,
    incoming_timestamp: Timestamp,
    now: Timestamp,
    valid_window: u64,
) -> (SequencingState, Vec<u64>) {
    let Some(expected_next) = state.expected_next else {
        if incoming_seq != 1 {
            return (state.clone(), Vec::new());
        }
        if now.saturating_sub(incoming_timestamp) > valid_window {
            return (state.clone(), Vec::new());
        }
        return deliver_run(state, incoming_seq);
    };

    if incoming_seq < expected_next {
        return (state.clone(), Vec::new());
    }

    if incoming_seq == expected_next {
        return deliver_run(state, incoming_seq);
    }

    let mut next = state.clone();
    next.out_of_order.insert(incoming_seq);
    (next, Vec::new())
}

/// Deliver `first` and every buffered number contiguous with it.
fn deliver_run(state: &SequencingState, first: u64) -> (SequencingState, Vec<u64>) {
    let mut out_of_order = state.out_of_order.clone();
    let mut delivered = vec![first];
    let mut expected_next = first + 1;

    while out_of_order.remove(&expected_next) {
        delivered.push(expected_next);
        expected_next += 1;
    }
    // Anything at or below the new contiguous point is already delivered.
    out_of_order.retain(|seq| *seq >= expected_next);

    (
        SequencingState {
            expected_next: Some(expected_next),
            out_of_order,
        },
        delivered,
    )
}
