//! # Session Container
//!
//! Holds the log, both state stores and both services, built once from a
//! [`NodeConfig`] and shared by every pipeline.
//!
//! ```text
//!              ┌──────────── InMemoryLog ────────────┐
//!              │                                     │
//!   SessionManagerService ── SessionStore    FlowMapperService ── MapperStore
//!              │
//!      ChannelFlowEngine ──→ FlowInbox
//! ```

pub mod config;

pub use config::{ConfigError, NodeConfig, RuntimeConfig};

use crate::adapters::{ChannelFlowEngine, FlowInbox};
use qc_18_session_manager::{SessionManagerService, SessionState};
use qc_19_flow_mapper::{FlowMapperService, FlowMapperState};
use shared_bus::{InMemoryLog, InMemoryStateStore, DEFAULT_CHANNEL_CAPACITY};
use shared_types::TimeSource;
use std::sync::Arc;
use tracing::info;

pub type SessionStore = InMemoryStateStore<SessionState>;
pub type MapperStore = InMemoryStateStore<FlowMapperState>;
pub type NodeSessionManager = SessionManagerService<SessionStore, InMemoryLog, ChannelFlowEngine>;
pub type NodeFlowMapper = FlowMapperService<MapperStore, InMemoryLog>;

/// Every long-lived component of a session node.
pub struct SessionContainer {
    pub config: NodeConfig,
    pub log: Arc<InMemoryLog>,
    pub session_store: Arc<SessionStore>,
    pub mapper_store: Arc<MapperStore>,
    pub session_manager: Arc<NodeSessionManager>,
    pub flow_mapper: Arc<NodeFlowMapper>,
}

impl SessionContainer {
    /// Build the container. Flow deliveries end up in the returned inbox.
    pub fn new(config: NodeConfig, clock: Arc<dyn TimeSource>) -> (Self, FlowInbox) {
        let partitions = config.runtime.partition_count;
        let log = Arc::new(InMemoryLog::with_config(DEFAULT_CHANNEL_CAPACITY, partitions));
        let session_store = Arc::new(InMemoryStateStore::with_partitions(partitions));
        let mapper_store = Arc::new(InMemoryStateStore::with_partitions(partitions));
        let (flow_engine, inbox) = ChannelFlowEngine::channel();

        let session_manager = Arc::new(SessionManagerService::new(
            config.session.clone(),
            Arc::clone(&session_store),
            Arc::clone(&log),
            Arc::new(flow_engine),
            Arc::clone(&clock),
        ));
        let flow_mapper = Arc::new(FlowMapperService::new(
            config.mapper.clone(),
            Arc::clone(&mapper_store),
            Arc::clone(&log),
            clock,
        ));
        info!(partitions, "Session container initialized");

        (
            Self {
                config,
                log,
                session_store,
                mapper_store,
                session_manager,
                flow_mapper,
            },
            inbox,
        )
    }
}
