//! # Housekeeping
//!
//! Periodic sweep over the sessions on partitions this node owns:
//!
//! - live sessions get their resend and timeout check
//! - terminal sessions whose mapper state is already cleaned up are retired

use super::pipeline::SharedAssignment;
use crate::container::{MapperStore, NodeSessionManager, SessionStore};
use qc_18_session_manager::SessionManagerApi;
use shared_bus::KeyedStateStore;
use shared_types::{SessionId, StateLookup};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Live sessions checked.
    pub live: usize,
    /// Records published by resends and timeouts.
    pub published: usize,
    /// Terminal sessions tombstoned.
    pub retired: usize,
}

pub struct Housekeeper {
    sessions: Arc<NodeSessionManager>,
    session_store: Arc<SessionStore>,
    mapper_store: Arc<MapperStore>,
    assignment: SharedAssignment,
    interval: Duration,
}

impl Housekeeper {
    pub fn new(
        sessions: Arc<NodeSessionManager>,
        session_store: Arc<SessionStore>,
        mapper_store: Arc<MapperStore>,
        assignment: SharedAssignment,
        interval: Duration,
    ) -> Self {
        Self {
            sessions,
            session_store,
            mapper_store,
            assignment,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Housekeeping started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    info!("Housekeeping stopped");
                    return;
                }
            }
        }
    }

    /// One pass over every owned session.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let states = match self.session_store.snapshot() {
            Ok(states) => states,
            Err(e) => {
                warn!(error = %e, "Session store unavailable, skipping sweep");
                return report;
            }
        };

        let mut live: Vec<SessionId> = Vec::new();
        let mut terminal: Vec<SessionId> = Vec::new();
        let assignment = self.assignment.read().await;
        for (key, state) in states {
            if !assignment.owns_key(&key) {
                continue;
            }
            if state.status.is_terminal() {
                terminal.push(key);
            } else {
                live.push(key);
            }
        }

        drop(assignment);

        report.live = live.len();
        if !live.is_empty() {
            match self.sessions.housekeep(&live).await {
                Ok(published) => report.published = published.len(),
                Err(e) => warn!(error = %e, sessions = live.len(), "Housekeeping failed"),
            }
        }

        for key in terminal {
            if !matches!(self.mapper_store.get(&key).await, Ok(StateLookup::Tombstoned)) {
                continue;
            }
            match self.sessions.retire(&key).await {
                Ok(true) => report.retired += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to retire session"),
            }
        }

        if report != SweepReport::default() {
            debug!(?report, "Housekeeping sweep done");
        }
        report
    }
}
