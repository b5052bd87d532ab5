//! # Topic Pipelines
//!
//! One consumer loop per input topic. Records are drained from the log
//! subscription into batches and handed to a service. A batch that fails on
//! transient I/O is retried whole after a backoff; the services are
//! idempotent under replay, so records that already went through are safe.
//! A fatal error stops the pipeline. Records on partitions this node does
//! not own are skipped.
//!
//! ```text
//! [flow.mapper.event] ──→ MapperHandler  ──→ FlowMapperService::on_next
//! [flow.event]        ──→ SessionHandler ──→ SessionManagerService::on_next
//! ```

use crate::container::{NodeFlowMapper, NodeSessionManager};
use async_trait::async_trait;
use qc_18_session_manager::{SessionManagerApi, SessionManagerError, SessionRecord};
use qc_19_flow_mapper::{FlowMapperApi, FlowMapperError};
use shared_bus::{LoggedRecord, PartitionAssignment, Subscription};
use shared_types::{Record, Topic};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

/// Partitions owned by this node, shared by every task that consumes them.
pub type SharedAssignment = Arc<RwLock<PartitionAssignment>>;

/// Failure of one batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Session(#[from] SessionManagerError),

    #[error(transparent)]
    Mapper(#[from] FlowMapperError),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Session(e) => e.is_transient(),
            Self::Mapper(e) => e.is_transient(),
        }
    }
}

/// A service that consumes one topic.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn topic(&self) -> Topic;

    /// Process `batch` in order. Returns how many records were published.
    async fn handle(&self, batch: Vec<Record>) -> Result<usize, PipelineError>;
}

/// Feeds the flow mapper.
pub struct MapperHandler(pub Arc<NodeFlowMapper>);

#[async_trait]
impl BatchHandler for MapperHandler {
    fn name(&self) -> &'static str {
        "qc-19"
    }

    fn topic(&self) -> Topic {
        Topic::FlowMapperEvent
    }

    async fn handle(&self, batch: Vec<Record>) -> Result<usize, PipelineError> {
        Ok(self.0.on_next(batch).await?.len())
    }
}

/// Feeds the session manager with events the mapper routed to local flows.
pub struct SessionHandler(pub Arc<NodeSessionManager>);

#[async_trait]
impl BatchHandler for SessionHandler {
    fn name(&self) -> &'static str {
        "qc-18"
    }

    fn topic(&self) -> Topic {
        Topic::FlowEvent
    }

    async fn handle(&self, batch: Vec<Record>) -> Result<usize, PipelineError> {
        let records: Vec<SessionRecord> = batch
            .iter()
            .filter_map(SessionRecord::from_flow_record)
            .collect();
        Ok(self.0.on_next(records).await?.len())
    }
}

/// Consumer loop for one handler.
pub struct TopicPipeline<H: BatchHandler> {
    subscription: Subscription,
    handler: H,
    assignment: SharedAssignment,
    max_batch_size: usize,
    retry_backoff: Duration,
}

impl<H: BatchHandler> TopicPipeline<H> {
    /// The subscription must already exist: records published before it
    /// was created are not seen.
    pub fn new(
        subscription: Subscription,
        handler: H,
        assignment: SharedAssignment,
        max_batch_size: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            subscription,
            handler,
            assignment,
            max_batch_size: max_batch_size.max(1),
            retry_backoff,
        }
    }

    /// Run until shutdown, until the log closes or until a fatal error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let name = self.handler.name();
        info!(pipeline = name, topic = %self.handler.topic(), "Pipeline started");

        loop {
            let next = tokio::select! {
                next = self.subscription.recv() => next,
                _ = shutdown.changed() => {
                    info!(pipeline = name, "Shutdown signal received");
                    return;
                }
            };
            let Some(first) = next else {
                info!(pipeline = name, "Log closed, exiting");
                return;
            };

            let mut drained = vec![first];
            while drained.len() < self.max_batch_size {
                match self.subscription.try_recv() {
                    Ok(Some(logged)) => drained.push(logged),
                    _ => break,
                }
            }

            let batch = self.owned_records(drained).await;
            if batch.is_empty() {
                continue;
            }
            if !self.process(batch, &mut shutdown).await {
                return;
            }
        }
    }

    async fn owned_records(&self, drained: Vec<LoggedRecord>) -> Vec<Record> {
        let assignment = self.assignment.read().await;
        drained
            .into_iter()
            .filter_map(|logged| {
                if assignment.owns_partition(logged.partition) {
                    Some(logged.record)
                } else {
                    debug!(
                        pipeline = self.handler.name(),
                        partition = logged.partition,
                        key = %logged.record.key,
                        "Skipping record on unowned partition"
                    );
                    None
                }
            })
            .collect()
    }

    /// Returns false once the pipeline must stop.
    async fn process(&self, batch: Vec<Record>, shutdown: &mut watch::Receiver<bool>) -> bool {
        let name = self.handler.name();
        let size = batch.len();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.handler.handle(batch.clone()).await {
                Ok(published) => {
                    debug!(pipeline = name, size, published, "Batch processed");
                    return true;
                }
                Err(e) if e.is_transient() => {
                    warn!(pipeline = name, size, attempt, error = %e, "Batch failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_backoff) => {}
                        _ = shutdown.changed() => return false,
                    }
                }
                Err(e) => {
                    error!(pipeline = name, size, error = %e, "Fatal error, stopping pipeline");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{partition_for, InMemoryLog, RecordFilter, RecordPublisher};
    use shared_types::FlowMapperEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls with a transient error.
    struct Flaky {
        failures: usize,
        calls: Arc<AtomicUsize>,
        seen: Arc<AtomicUsize>,
        fatal: bool,
    }

    #[async_trait]
    impl BatchHandler for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn topic(&self) -> Topic {
            Topic::FlowMapperEvent
        }

        async fn handle(&self, batch: Vec<Record>) -> Result<usize, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fatal {
                return Err(FlowMapperError::InvariantViolation {
                    key: "abc".into(),
                    reason: "broken".into(),
                }
                .into());
            }
            if call < self.failures {
                return Err(FlowMapperError::Store(shared_bus::BusError::Unavailable {
                    component: "state store",
                    reason: "down".into(),
                })
                .into());
            }
            self.seen.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(0)
        }
    }

    fn owning_all(log: &InMemoryLog) -> SharedAssignment {
        let mut assignment = PartitionAssignment::new(log.partition_count());
        let all: Vec<_> = (0..log.partition_count()).collect();
        assignment.assign(&all);
        Arc::new(RwLock::new(assignment))
    }

    fn pipeline(
        log: &InMemoryLog,
        failures: usize,
        fatal: bool,
    ) -> (TopicPipeline<Flaky>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        pipeline_owning(log, owning_all(log), failures, fatal)
    }

    fn pipeline_owning(
        log: &InMemoryLog,
        assignment: SharedAssignment,
        failures: usize,
        fatal: bool,
    ) -> (TopicPipeline<Flaky>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = Flaky {
            failures,
            calls: Arc::clone(&calls),
            seen: Arc::clone(&seen),
            fatal,
        };
        let subscription = log.subscribe(RecordFilter::topics(vec![Topic::FlowMapperEvent]));
        (
            TopicPipeline::new(
                subscription,
                handler,
                assignment,
                10,
                Duration::from_millis(100),
            ),
            calls,
            seen,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_whole_batch() {
        let log = InMemoryLog::new();
        let (pipeline, calls, seen) = pipeline(&log, 2, false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        log.publish(Record::mapper_event("a", FlowMapperEvent::ExecuteCleanup))
            .await
            .unwrap();
        log.publish(Record::mapper_event("b", FlowMapperEvent::ExecuteCleanup))
            .await
            .unwrap();
        let handle = tokio::spawn(pipeline.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_pipeline() {
        let log = InMemoryLog::new();
        let (pipeline, calls, _) = pipeline(&log, 0, true);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        log.publish(Record::mapper_event("a", FlowMapperEvent::ExecuteCleanup))
            .await
            .unwrap();
        pipeline.run(shutdown_rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_on_unowned_partitions_are_skipped() {
        let log = InMemoryLog::with_config(16, 8);
        let first = "a";
        let second = (0..)
            .map(|i| format!("k{i}"))
            .find(|k| partition_for(k, 8) != partition_for(first, 8))
            .unwrap();
        let mut assignment = PartitionAssignment::new(8);
        assignment.assign(&[partition_for(first, 8)]);
        let assignment = Arc::new(RwLock::new(assignment));
        let (pipeline, calls, seen) = pipeline_owning(&log, Arc::clone(&assignment), 0, false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        log.publish(Record::mapper_event(first, FlowMapperEvent::ExecuteCleanup))
            .await
            .unwrap();
        log.publish(Record::mapper_event(&second, FlowMapperEvent::ExecuteCleanup))
            .await
            .unwrap();
        let handle = tokio::spawn(pipeline.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // nothing owned, nothing handed over
        assignment.write().await.revoke(&[partition_for(first, 8)]);
        log.publish(Record::mapper_event(first, FlowMapperEvent::ExecuteCleanup))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
