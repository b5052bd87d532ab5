//! Mapper cleanup across session close, timers and partition moves.

use super::harness::{MapperService, Network, START};
use qc_18_session_manager::{SessionManagerApi, SessionStatus};
use qc_19_flow_mapper::{
    FlowMapperApi, FlowMapperConfig, FlowMapperService, FlowMapperState, FlowMapperStatus,
    TaskPhase,
};
use shared_bus::{
    partition_for, InMemoryLog, InMemoryStateStore, KeyedStateStore, PartitionAssignment,
    RebalanceListener,
};
use shared_types::{
    FlowMapperEvent, ManualTimeSource, Record, RecordValue, SessionEvent, StateLookup, TimeSource,
    Topic,
};
use std::sync::Arc;
use std::time::Duration;

const GRACE: u64 = 30_000;

// =============================================================================
// CLOSE HANDSHAKE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_handshake_then_scheduled_cleanup() {
    let net = Network::new();
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;
    let closed_at = net.now();

    net.alice.send("alice-flow", SessionEvent::close("s1", net.now())).await;
    net.settle().await;

    let alice = net.alice.session("s1").await.unwrap();
    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Closing);
    assert_eq!(bob.status, SessionStatus::Closing);
    assert!(net.bob.flows.closed(&bob_flow));

    net.bob
        .send(&bob_flow, SessionEvent::close("s1-INITIATED", net.now()))
        .await;
    net.settle().await;

    let alice = net.alice.session("s1").await.unwrap();
    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Closed);
    assert_eq!(bob.status, SessionStatus::Closed);
    assert!(net.alice.flows.closed("alice-flow"));

    let mapper = net.alice.mapper_state("s1").await.into_known().unwrap();
    assert_eq!(mapper.status, FlowMapperStatus::Closing);
    assert_eq!(mapper.expiry_time, Some(closed_at + GRACE));
    assert_eq!(
        net.alice.mapper.scheduled_tasks().phase("s1"),
        Some(TaskPhase::Scheduled)
    );
    assert_eq!(net.alice.cleanups("s1"), 0);

    net.advance(GRACE + 1).await;
    assert_eq!(net.alice.cleanups("s1"), 1);
    assert_eq!(net.bob.cleanups("s1-INITIATED"), 1);

    net.settle().await;
    assert_eq!(net.alice.mapper_state("s1").await, StateLookup::Tombstoned);
    assert_eq!(net.bob.mapper_state("s1-INITIATED").await, StateLookup::Tombstoned);
    assert!(net.alice.mapper.scheduled_tasks().is_empty());

    assert!(net.alice.sessions.retire("s1").await.unwrap());
    assert!(net.bob.sessions.retire("s1-INITIATED").await.unwrap());
    assert_eq!(
        net.alice.sessions.get_state("s1").await.unwrap(),
        StateLookup::Tombstoned
    );

    // nothing re-arms once the state is gone
    net.advance(GRACE * 2).await;
    assert_eq!(net.alice.cleanups("s1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_behind_unacked_data_closes_after_ack() {
    let net = Network::new();
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;

    net.alice
        .send("alice-flow", SessionEvent::data("s1", net.now(), b"last".to_vec()))
        .await;
    net.alice.send("alice-flow", SessionEvent::close("s1", net.now())).await;
    let alice = net.alice.session("s1").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Confirmed);
    assert_eq!(alice.expiry_timestamp, None);

    net.settle().await;
    let alice = net.alice.session("s1").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Closing);
    assert_eq!(
        net.bob.flows.payloads(&bob_flow),
        vec![b"hello".to_vec(), b"last".to_vec()]
    );
    assert!(net.bob.flows.closed(&bob_flow));

    net.bob
        .send(&bob_flow, SessionEvent::close("s1-INITIATED", net.now()))
        .await;
    net.settle().await;
    assert_eq!(
        net.alice.session("s1").await.unwrap().status,
        SessionStatus::Closed
    );
    assert_eq!(
        net.bob.session("s1-INITIATED").await.unwrap().status,
        SessionStatus::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_live_session_is_not_retired() {
    let net = Network::new();
    net.open("s1", "alice-flow", b"hello").await;
    net.alice.send("alice-flow", SessionEvent::close("s1", net.now())).await;
    net.settle().await;

    assert!(!net.alice.sessions.retire("s1").await.unwrap());
    assert!(net.alice.session("s1").await.is_some());
    assert!(net.alice.mapper.scheduled_tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replayed_cleanup_record_changes_nothing() {
    let net = Network::new();
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;
    net.alice.send("alice-flow", SessionEvent::close("s1", net.now())).await;
    net.settle().await;
    net.bob
        .send(&bob_flow, SessionEvent::close("s1-INITIATED", net.now()))
        .await;
    net.settle().await;
    net.advance(GRACE + 1).await;
    net.settle().await;

    let replay = net.alice.log.records_for_key(Topic::FlowMapperEvent, "s1");
    net.alice.mapper.on_next(replay).await.unwrap();

    assert_eq!(net.alice.mapper_state("s1").await, StateLookup::Tombstoned);
    assert!(net.alice.mapper.scheduled_tasks().is_empty());
    net.advance(GRACE * 2).await;
    assert_eq!(net.alice.cleanups("s1"), 1);
}

// =============================================================================
// PARTITION MOVES
// =============================================================================

struct Owner {
    service: MapperService,
    assignment: PartitionAssignment,
}

struct Cluster {
    clock: Arc<ManualTimeSource>,
    store: Arc<InMemoryStateStore<FlowMapperState>>,
    log: Arc<InMemoryLog>,
}

impl Cluster {
    fn new() -> Self {
        Self {
            clock: Arc::new(ManualTimeSource::new(START)),
            store: Arc::new(InMemoryStateStore::new()),
            log: Arc::new(InMemoryLog::new()),
        }
    }

    fn owner(&self) -> Owner {
        Owner {
            service: FlowMapperService::new(
                FlowMapperConfig::default(),
                self.store.clone(),
                self.log.clone(),
                self.clock.clone(),
            ),
            assignment: PartitionAssignment::new(self.store.partition_count()),
        }
    }

    fn partition(&self, key: &str) -> shared_bus::PartitionId {
        partition_for(key, self.store.partition_count())
    }

    fn cleanups(&self, key: &str) -> usize {
        self.log
            .records_for_key(Topic::FlowMapperEvent, key)
            .iter()
            .filter(|r| r.value == RecordValue::MapperEvent(FlowMapperEvent::ExecuteCleanup))
            .count()
    }

    async fn closing(&self, owner: &Owner, key: &str, expiry: u64) {
        owner
            .service
            .on_next(vec![
                Record::mapper_event(
                    key,
                    FlowMapperEvent::Session {
                        event: SessionEvent::init(key, self.clock.now(), vec![]),
                        flow_id: Some(format!("{key}-flow")),
                    },
                ),
                Record::mapper_event(
                    key,
                    FlowMapperEvent::ScheduleCleanup {
                        expiry_time: Some(expiry),
                    },
                ),
            ])
            .await
            .unwrap();
    }
}

impl Owner {
    async fn gain(&mut self, cluster: &Cluster, key: &str) {
        let partition = cluster.partition(key);
        let gained = self.assignment.assign(&[partition]);
        let states = cluster.store.snapshot_partitions(&gained).unwrap();
        self.service.on_partition_synced(&states).await;
    }

    async fn lose(&mut self, cluster: &Cluster, key: &str) {
        let partition = cluster.partition(key);
        let lost = self.assignment.revoke(&[partition]);
        let states = cluster.store.snapshot_partitions(&lost).unwrap();
        self.service.on_partition_lost(&states).await;
    }
}

async fn sleep_ms(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn test_expired_state_on_new_owner_is_cleaned_at_once() {
    let cluster = Cluster::new();
    let expiry = START - 10;
    cluster
        .store
        .put(
            "s1",
            &FlowMapperState {
                flow_id: Some("flow-1".into()),
                expiry_time: Some(expiry),
                status: FlowMapperStatus::Closing,
            },
        )
        .await
        .unwrap();

    let mut owner = cluster.owner();
    owner.gain(&cluster, "s1").await;

    assert_eq!(cluster.cleanups("s1"), 1);
    assert_eq!(owner.service.scheduled_tasks().phase("s1"), Some(TaskPhase::Fired));

    let cleanup = cluster.log.records_for_key(Topic::FlowMapperEvent, "s1");
    owner.service.on_next(cleanup).await.unwrap();
    assert_eq!(cluster.store.get("s1").await.unwrap(), StateLookup::Tombstoned);

    sleep_ms(GRACE).await;
    assert_eq!(cluster.cleanups("s1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_moves_with_the_partition() {
    let cluster = Cluster::new();
    let mut first = cluster.owner();
    let mut second = cluster.owner();
    first.gain(&cluster, "s1").await;

    cluster.closing(&first, "s1", START + 1_000).await;
    assert_eq!(first.service.scheduled_tasks().phase("s1"), Some(TaskPhase::Scheduled));

    first.lose(&cluster, "s1").await;
    assert!(first.service.scheduled_tasks().is_empty());
    second.gain(&cluster, "s1").await;
    assert_eq!(second.service.scheduled_tasks().phase("s1"), Some(TaskPhase::Scheduled));

    cluster.clock.advance(1_001);
    sleep_ms(1_001).await;
    assert_eq!(cluster.cleanups("s1"), 1);

    let cleanup = cluster.log.records_for_key(Topic::FlowMapperEvent, "s1");
    let cleanup: Vec<Record> = cleanup
        .into_iter()
        .filter(|r| r.value == RecordValue::MapperEvent(FlowMapperEvent::ExecuteCleanup))
        .collect();
    second.service.on_next(cleanup).await.unwrap();
    assert_eq!(
        second.service.get_state("s1").await.unwrap(),
        StateLookup::Tombstoned
    );
}

#[tokio::test(start_paused = true)]
async fn test_unowned_state_is_never_cleaned() {
    let cluster = Cluster::new();
    let mut owner = cluster.owner();
    owner.gain(&cluster, "s1").await;
    cluster.closing(&owner, "s1", START + 1_000).await;

    owner.lose(&cluster, "s1").await;
    cluster.clock.advance(10_000);
    sleep_ms(10_000).await;

    assert_eq!(cluster.cleanups("s1"), 0);
    let state = cluster.store.get("s1").await.unwrap().into_known().unwrap();
    assert!(state.is_closing());
}

#[tokio::test(start_paused = true)]
async fn test_resync_of_owned_partition_does_not_double_fire() {
    let cluster = Cluster::new();
    let mut owner = cluster.owner();
    owner.gain(&cluster, "s1").await;
    cluster.closing(&owner, "s1", START + 1_000).await;

    cluster.clock.advance(1_001);
    sleep_ms(1_001).await;
    assert_eq!(cluster.cleanups("s1"), 1);

    // cleanup published but not consumed yet; the state is still CLOSING
    let states = cluster.store.snapshot().unwrap();
    owner.service.on_partition_synced(&states).await;
    assert_eq!(cluster.cleanups("s1"), 1);
}
