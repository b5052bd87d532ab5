//! # Per-Key Locks
//!
//! Every read-modify-write of a session state runs under the lock of its
//! key, so the consuming pipeline, housekeeping sweeps and local submissions
//! never interleave on one session. Keys hash onto a fixed set of stripes
//! with the same murmur3 partitioner the log uses; unrelated keys may share
//! a stripe.

use shared_bus::partition_for;
use tokio::sync::{Mutex, MutexGuard};

/// Stripes used by [`SessionManagerService`](crate::SessionManagerService).
pub const DEFAULT_LOCK_STRIPES: u32 = 64;

pub struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    pub fn new(stripes: u32) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let stripe = partition_for(key, self.stripes.len() as u32) as usize;
        self.stripes[stripe].lock().await
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_STRIPES)
    }
}
