//! # Node Runtime
//!
//! Owns the container and the spawned tasks of a session node.
//!
//! ## Startup Sequence
//!
//! 1. Subscribe both pipelines, so nothing published from here on is missed
//! 2. Take ownership of every partition and hand the mapper states of those
//!    partitions to the flow mapper, which re-arms or fires cleanup timers
//! 3. Spawn the pipelines and the housekeeping sweep
//!
//! ## Shutdown Sequence
//!
//! 1. Signal every task and wait for it to stop
//! 2. Release the partitions, cancelling every cleanup timer keyed on them
//!    and handing their mapper states to the flow mapper

use crate::adapters::FlowInbox;
use crate::container::{NodeConfig, SessionContainer};
use crate::handlers::{
    Housekeeper, MapperHandler, SessionHandler, SharedAssignment, TopicPipeline,
};
use anyhow::{Context, Result};
use qc_18_session_manager::{SessionManagerApi, SessionRecord};
use shared_bus::{PartitionAssignment, PartitionId, RebalanceListener, RecordFilter};
use shared_types::{FlowId, Record, SessionEvent, TimeSource, Topic};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct NodeRuntime {
    container: Arc<SessionContainer>,
    assignment: SharedAssignment,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    /// Create a runtime. Deliveries for local flows arrive on the returned inbox.
    pub fn new(config: NodeConfig, clock: Arc<dyn TimeSource>) -> (Self, FlowInbox) {
        let partitions = config.runtime.partition_count;
        let (container, inbox) = SessionContainer::new(config, clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                container: Arc::new(container),
                assignment: Arc::new(RwLock::new(PartitionAssignment::new(partitions))),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
                shutdown_rx,
            },
            inbox,
        )
    }

    pub fn container(&self) -> Arc<SessionContainer> {
        Arc::clone(&self.container)
    }

    /// Partitions this node currently owns.
    pub fn assignment(&self) -> SharedAssignment {
        Arc::clone(&self.assignment)
    }

    pub async fn start(&self) -> Result<()> {
        let container = &self.container;
        let runtime = &container.config.runtime;
        container
            .config
            .validate()
            .context("Refusing to start with invalid configuration")?;

        let mapper = TopicPipeline::new(
            container
                .log
                .subscribe(RecordFilter::topics(vec![Topic::FlowMapperEvent])),
            MapperHandler(Arc::clone(&container.flow_mapper)),
            Arc::clone(&self.assignment),
            runtime.max_batch_size,
            runtime.retry_backoff(),
        );
        let sessions = TopicPipeline::new(
            container.log.subscribe(RecordFilter::topics(vec![Topic::FlowEvent])),
            SessionHandler(Arc::clone(&container.session_manager)),
            Arc::clone(&self.assignment),
            runtime.max_batch_size,
            runtime.retry_backoff(),
        );
        let housekeeper = Housekeeper::new(
            Arc::clone(&container.session_manager),
            Arc::clone(&container.session_store),
            Arc::clone(&container.mapper_store),
            Arc::clone(&self.assignment),
            runtime.housekeeping_interval(),
        );

        let all: Vec<PartitionId> = (0..runtime.partition_count).collect();
        let gained = self.assignment.write().await.assign(&all);
        let states = container
            .mapper_store
            .snapshot_partitions(&gained)
            .context("Failed to load mapper states for assigned partitions")?;
        container.flow_mapper.on_partition_synced(&states).await;
        info!(partitions = gained.len(), states = states.len(), "Partitions assigned");

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(mapper.run(self.shutdown_rx.clone())));
        tasks.push(tokio::spawn(sessions.run(self.shutdown_rx.clone())));
        tasks.push(tokio::spawn(housekeeper.run(self.shutdown_rx.clone())));

        info!("Session node running");
        Ok(())
    }

    /// Submit an event from the local flow `flow_id`.
    pub async fn submit(&self, flow_id: impl Into<FlowId>, event: SessionEvent) -> Result<Vec<Record>> {
        let records = self
            .container
            .session_manager
            .on_next(vec![SessionRecord::outbound(flow_id, event)])
            .await?;
        Ok(records)
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Task ended abnormally");
            }
        }

        let (lost, partition_count) = {
            let mut assignment = self.assignment.write().await;
            let owned: Vec<PartitionId> = assignment.owned().iter().copied().collect();
            (assignment.revoke(&owned), assignment.partition_count())
        };
        let cancelled = self
            .container
            .flow_mapper
            .scheduled_tasks()
            .cancel_partitions(&lost, partition_count)
            .await;
        info!(partitions = lost.len(), timers = cancelled, "Partitions released");
        match self.container.mapper_store.snapshot_partitions(&lost) {
            Ok(states) => self.container.flow_mapper.on_partition_lost(&states).await,
            Err(e) => error!(error = %e, "Failed to load mapper states for released partitions"),
        }
        info!("Shutdown complete");
    }
}
