//! # Scheduled Task Table
//!
//! One cleanup timer per CLOSING mapper state, owned by this process.
//!
//! ```text
//!            schedule()                 sleep elapsed, CAS
//!   NONE ───────────────→ SCHEDULED ─────────────────────→ FIRED ──→ publish ExecuteCleanup
//!                             │
//!                             └── cancel(), CAS ──→ CANCELLED ──→ abort
//! ```
//!
//! Fire and cancel race on one atomic compare-and-swap, so a timer publishes
//! at most once. A fired timer whose publish fails transiently keeps retrying
//! with capped exponential backoff until it succeeds or the key is cancelled. A FIRED entry stays in the table until the state is deleted
//! or the partition is lost, which keeps later commits of the same CLOSING
//! state from arming a second timer.

use crate::domain::create_cleanup_record;
use crate::metrics;
use parking_lot::Mutex;
use shared_bus::{partition_for, BusResult, PartitionId, RecordPublisher};
use shared_types::{TimeSource, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// First delay before republishing a cleanup record that failed to publish.
pub const CLEANUP_RETRY_INITIAL: Duration = Duration::from_millis(100);

/// Upper bound on the delay between cleanup publish attempts.
pub const CLEANUP_RETRY_MAX: Duration = Duration::from_secs(10);

/// Phase of one cleanup timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskPhase {
    Scheduled = 0,
    Fired = 1,
    Cancelled = 2,
}

impl TaskPhase {
    fn load(cell: &AtomicU8) -> Self {
        match cell.load(Ordering::SeqCst) {
            0 => Self::Scheduled,
            1 => Self::Fired,
            _ => Self::Cancelled,
        }
    }
}

struct ScheduledTask {
    expiry_time: Timestamp,
    phase: Arc<AtomicU8>,
    /// `None` when the cleanup was published inline.
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    fn phase(&self) -> TaskPhase {
        TaskPhase::load(&self.phase)
    }

    /// Stop the timer if it has not fired. Returns true if it was stopped.
    fn cancel(&self) -> bool {
        let stopped = transition(&self.phase, TaskPhase::Scheduled, TaskPhase::Cancelled);
        if stopped {
            if let Some(handle) = &self.handle {
                handle.abort();
            }
            metrics::record_timer_cancelled();
        }
        stopped
    }
}

fn transition(cell: &AtomicU8, from: TaskPhase, to: TaskPhase) -> bool {
    cell.compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Process-local table of cleanup timers, keyed by session key.
///
/// Reconciled with partition ownership through the rebalance listener; it
/// never decides ownership itself.
pub struct ScheduledTaskState<P>
where
    P: RecordPublisher + 'static,
{
    tasks: Mutex<HashMap<String, ScheduledTask>>,
    publisher: Arc<P>,
    clock: Arc<dyn TimeSource>,
}

impl<P> ScheduledTaskState<P>
where
    P: RecordPublisher + 'static,
{
    pub fn new(publisher: Arc<P>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            publisher,
            clock,
        }
    }

    /// Arm the cleanup timer for `key` at `expiry_time`.
    ///
    /// No-op (returns false) if a timer for the same expiry is armed or the
    /// cleanup for `key` already fired. A pending timer for another expiry
    /// is replaced. Must be called from within a tokio runtime.
    pub fn schedule(&self, key: &str, expiry_time: Timestamp) -> bool {
        let mut tasks = self.tasks.lock();
        if let Some(existing) = tasks.get(key) {
            match existing.phase() {
                TaskPhase::Fired => return false,
                TaskPhase::Scheduled if existing.expiry_time == expiry_time => return false,
                TaskPhase::Scheduled | TaskPhase::Cancelled => {}
            }
        }
        if let Some(previous) = tasks.remove(key) {
            previous.cancel();
        }

        let delay = Duration::from_millis(expiry_time.saturating_sub(self.clock.now()));
        let phase = Arc::new(AtomicU8::new(TaskPhase::Scheduled as u8));
        let handle = tokio::spawn(fire_after(
            key.to_string(),
            delay,
            Arc::clone(&phase),
            Arc::clone(&self.publisher),
        ));
        tasks.insert(
            key.to_string(),
            ScheduledTask {
                expiry_time,
                phase,
                handle: Some(handle),
            },
        );
        metrics::record_timer_armed();
        debug!(key, expiry_time, delay_ms = delay.as_millis() as u64, "Cleanup timer armed");
        true
    }

    /// Publish the cleanup for `key` now, without a timer.
    ///
    /// Returns `Ok(false)` if the cleanup for `key` already fired.
    ///
    /// # Errors
    ///
    /// The publish failed. The entry is left CANCELLED so a later commit
    /// can arm a timer again.
    pub async fn fire_now(&self, key: &str, expiry_time: Timestamp) -> BusResult<bool> {
        let phase = {
            let mut tasks = self.tasks.lock();
            if tasks
                .get(key)
                .is_some_and(|task| task.phase() == TaskPhase::Fired)
            {
                return Ok(false);
            }
            if let Some(previous) = tasks.remove(key) {
                previous.cancel();
            }
            let phase = Arc::new(AtomicU8::new(TaskPhase::Fired as u8));
            tasks.insert(
                key.to_string(),
                ScheduledTask {
                    expiry_time,
                    phase: Arc::clone(&phase),
                    handle: None,
                },
            );
            phase
        };

        match self.publisher.publish(create_cleanup_record(key)).await {
            Ok(offset) => {
                metrics::record_cleanup_published();
                debug!(key, offset, "Expired session cleanup published");
                Ok(true)
            }
            Err(e) => {
                phase.store(TaskPhase::Cancelled as u8, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Forget the timer for `key`, stopping it if it has not fired.
    ///
    /// Returns true if a pending timer was stopped. A fired timer that is
    /// still retrying its publish is stopped too.
    pub fn cancel(&self, key: &str) -> bool {
        let Some(task) = self.tasks.lock().remove(key) else {
            return false;
        };
        let stopped = task.cancel();
        if let Some(handle) = &task.handle {
            handle.abort();
        }
        stopped
    }

    /// Cancel every timer for `keys` and wait until none of them can still publish.
    pub async fn cancel_all(&self, keys: &[&str]) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock();
            keys.iter()
                .filter_map(|key| tasks.remove(*key))
                .filter_map(|task| {
                    task.cancel();
                    task.handle
                })
                .collect()
        };

        for handle in handles {
            // A timer that already fired may still be publishing.
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Cleanup timer task failed");
                }
            }
        }
    }

    /// Cancel every timer whose key lives on one of `lost`, whatever the
    /// state store still holds. Returns how many were dropped.
    pub async fn cancel_partitions(&self, lost: &[PartitionId], partition_count: u32) -> usize {
        let keys: Vec<String> = self
            .tasks
            .lock()
            .keys()
            .filter(|key| lost.contains(&partition_for(key, partition_count)))
            .cloned()
            .collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.cancel_all(&refs).await;
        if !keys.is_empty() {
            debug!(
                timers = keys.len(),
                partitions = lost.len(),
                "Timers of released partitions cancelled"
            );
        }
        keys.len()
    }

    /// Phase of the timer for `key`, if one is tracked.
    #[must_use]
    pub fn phase(&self, key: &str) -> Option<TaskPhase> {
        self.tasks.lock().get(key).map(ScheduledTask::phase)
    }

    /// Number of tracked timers, in any phase.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl<P> Drop for ScheduledTaskState<P>
where
    P: RecordPublisher + 'static,
{
    fn drop(&mut self) {
        for task in self.tasks.get_mut().values() {
            if let Some(handle) = &task.handle {
                handle.abort();
            }
        }
    }
}

async fn fire_after<P>(key: String, delay: Duration, phase: Arc<AtomicU8>, publisher: Arc<P>)
where
    P: RecordPublisher + 'static,
{
    tokio::time::sleep(delay).await;
    if !transition(&phase, TaskPhase::Scheduled, TaskPhase::Fired) {
        return;
    }

    let mut backoff = CLEANUP_RETRY_INITIAL;
    loop {
        match publisher.publish(create_cleanup_record(&key)).await {
            Ok(offset) => {
                metrics::record_cleanup_published();
                debug!(key = %key, offset, "Cleanup timer fired");
                return;
            }
            Err(e) if e.is_transient() => {
                warn!(
                    key = %key,
                    error = %e,
                    retry_in_ms = backoff.as_millis() as u64,
                    "Failed to publish cleanup record, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(CLEANUP_RETRY_MAX);
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to publish cleanup record");
                phase.store(TaskPhase::Cancelled as u8, Ordering::SeqCst);
                return;
            }
        }
    }
}
