//! Two-node test network.
//!
//! ```text
//!  Alice                                                          Bob
//!  flow ─→ SessionManager ─→ [flow.mapper.event] ─→ FlowMapper ─→ [p2p.out] ══╗
//!   ↑                                                   │                     ║ transport
//!   └── deliver ── SessionManager ←─ [flow.event] ←─────┘                     ║
//!                                                 [flow.mapper.event] ←═══════╝
//! ```
//!
//! Nothing runs on its own: tests drive each node with `step`, move
//! `p2p.out` records with `outbound`/`receive` (dropping, reordering or
//! duplicating them at will), or call `Network::settle` for a perfect
//! transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use qc_18_session_manager::{
    FlowDelivery, FlowEngine, SessionManagerApi, SessionManagerConfig, SessionManagerResult,
    SessionManagerService, SessionRecord, SessionState,
};
use qc_19_flow_mapper::{FlowMapperApi, FlowMapperConfig, FlowMapperService, FlowMapperState};
use shared_bus::{InMemoryLog, InMemoryStateStore, RecordPublisher};
use shared_types::{
    ErrorEnvelope, FlowId, FlowMapperEvent, ManualTimeSource, Record, RecordValue, SessionEvent,
    TimeSource, Timestamp, Topic,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Wall-clock start of every test network.
pub const START: Timestamp = 1_700_000_000_000;

const MAX_ROUNDS: usize = 64;

/// Flow engine that records every delivery.
#[derive(Default)]
pub struct RecordingFlowEngine {
    delivered: Mutex<Vec<(FlowId, FlowDelivery)>>,
}

impl RecordingFlowEngine {
    pub fn deliveries(&self) -> Vec<(FlowId, FlowDelivery)> {
        self.delivered.lock().clone()
    }

    /// Distinct flows that received anything, in first-delivery order.
    pub fn flows(&self) -> Vec<FlowId> {
        let mut flows: Vec<FlowId> = Vec::new();
        for (flow_id, _) in self.delivered.lock().iter() {
            if !flows.contains(flow_id) {
                flows.push(flow_id.clone());
            }
        }
        flows
    }

    pub fn payloads(&self, flow_id: &str) -> Vec<Vec<u8>> {
        self.delivered
            .lock()
            .iter()
            .filter(|(f, _)| f == flow_id)
            .filter_map(|(_, d)| match d {
                FlowDelivery::Payload { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, flow_id: &str) -> Vec<ErrorEnvelope> {
        self.delivered
            .lock()
            .iter()
            .filter(|(f, _)| f == flow_id)
            .filter_map(|(_, d)| match d {
                FlowDelivery::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self, flow_id: &str) -> bool {
        self.delivered
            .lock()
            .iter()
            .any(|(f, d)| f == flow_id && *d == FlowDelivery::Closed)
    }
}

#[async_trait]
impl FlowEngine for RecordingFlowEngine {
    async fn deliver(&self, flow_id: &FlowId, delivery: FlowDelivery) -> SessionManagerResult<()> {
        self.delivered.lock().push((flow_id.clone(), delivery));
        Ok(())
    }
}

pub type SessionService =
    SessionManagerService<InMemoryStateStore<SessionState>, InMemoryLog, RecordingFlowEngine>;
pub type MapperService = FlowMapperService<InMemoryStateStore<FlowMapperState>, InMemoryLog>;

/// One side of a session: session manager, flow mapper and their log.
pub struct Node {
    pub log: Arc<InMemoryLog>,
    pub sessions: SessionService,
    pub session_store: Arc<InMemoryStateStore<SessionState>>,
    pub mapper: MapperService,
    pub mapper_store: Arc<InMemoryStateStore<FlowMapperState>>,
    pub flows: Arc<RecordingFlowEngine>,
    cursors: Mutex<HashMap<Topic, usize>>,
}

impl Node {
    pub fn new(clock: Arc<ManualTimeSource>, config: SessionManagerConfig) -> Self {
        let log = Arc::new(InMemoryLog::new());
        let session_store = Arc::new(InMemoryStateStore::new());
        let mapper_store = Arc::new(InMemoryStateStore::new());
        let flows = Arc::new(RecordingFlowEngine::default());

        let mapper_config = FlowMapperConfig {
            cleanup_grace_period_ms: config.cleanup_grace_period_ms,
        };
        let sessions = SessionManagerService::new(
            config,
            session_store.clone(),
            log.clone(),
            flows.clone(),
            clock.clone(),
        );
        let mapper = FlowMapperService::new(mapper_config, mapper_store.clone(), log.clone(), clock);

        Self {
            log,
            sessions,
            session_store,
            mapper,
            mapper_store,
            flows,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Records appended to `topic` since the last call.
    pub fn take(&self, topic: Topic) -> Vec<Record> {
        let records = self.log.records(topic);
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(topic).or_insert(0);
        let fresh = records.iter().skip(*cursor).cloned().collect();
        *cursor = records.len();
        fresh
    }

    /// The local flow `flow_id` submits `event`.
    pub async fn send(&self, flow_id: &str, event: SessionEvent) {
        self.sessions
            .on_next(vec![SessionRecord::outbound(flow_id, event)])
            .await
            .unwrap();
    }

    /// Run the mapper and the session manager until their input topics are drained.
    pub async fn step(&self) -> usize {
        let mut processed = 0;
        loop {
            let mapper_batch = self.take(Topic::FlowMapperEvent);
            let flow_batch: Vec<SessionRecord> = self
                .take(Topic::FlowEvent)
                .iter()
                .filter_map(SessionRecord::from_flow_record)
                .collect();
            if mapper_batch.is_empty() && flow_batch.is_empty() {
                return processed;
            }
            processed += mapper_batch.len() + flow_batch.len();
            self.mapper.on_next(mapper_batch).await.unwrap();
            self.sessions.on_next(flow_batch).await.unwrap();
        }
    }

    /// New `p2p.out` records, ready for the transport.
    pub fn outbound(&self) -> Vec<Record> {
        self.take(Topic::P2POut)
    }

    /// The transport hands the counterparty's `p2p.out` records to this node.
    pub async fn receive(&self, records: Vec<Record>) {
        for record in records {
            let RecordValue::Session(event) = record.value else {
                continue;
            };
            self.log
                .publish(Record::mapper_event(
                    record.key,
                    FlowMapperEvent::Session {
                        event,
                        flow_id: None,
                    },
                ))
                .await
                .unwrap();
        }
    }

    pub async fn session(&self, key: &str) -> Option<SessionState> {
        self.sessions.get_state(key).await.unwrap().into_known()
    }

    pub async fn mapper_state(&self, key: &str) -> shared_types::StateLookup<FlowMapperState> {
        self.mapper.get_state(key).await.unwrap()
    }

    /// `p2p.out` session events addressed to `key`, ignoring the transport cursor.
    pub fn sent_to(&self, key: &str) -> Vec<SessionEvent> {
        self.log
            .records_for_key(Topic::P2POut, key)
            .iter()
            .filter_map(|r| r.session_event().cloned())
            .collect()
    }

    /// Cleanup records published for `key`.
    pub fn cleanups(&self, key: &str) -> usize {
        self.log
            .records_for_key(Topic::FlowMapperEvent, key)
            .iter()
            .filter(|r| r.value == RecordValue::MapperEvent(FlowMapperEvent::ExecuteCleanup))
            .count()
    }
}

/// Alice (initiator) and Bob (responder) joined by a transport.
pub struct Network {
    pub clock: Arc<ManualTimeSource>,
    pub alice: Node,
    pub bob: Node,
}

impl Network {
    pub fn new() -> Self {
        Self::with_config(SessionManagerConfig::default())
    }

    pub fn with_config(config: SessionManagerConfig) -> Self {
        let clock = Arc::new(ManualTimeSource::new(START));
        Self {
            alice: Node::new(clock.clone(), config.clone()),
            bob: Node::new(clock.clone(), config),
            clock,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Deliver everything, perfectly, until no node has work left.
    pub async fn settle(&self) {
        for _ in 0..MAX_ROUNDS {
            let mut moved = self.alice.step().await + self.bob.step().await;
            let to_bob = self.alice.outbound();
            let to_alice = self.bob.outbound();
            moved += to_bob.len() + to_alice.len();
            self.bob.receive(to_bob).await;
            self.alice.receive(to_alice).await;
            if moved == 0 {
                return;
            }
        }
        panic!("network did not settle after {MAX_ROUNDS} rounds");
    }

    /// Alice's `alice_flow` opens `session_id`. Returns the flow started on Bob.
    pub async fn open(&self, session_id: &str, alice_flow: &str, payload: &[u8]) -> FlowId {
        self.alice
            .send(alice_flow, SessionEvent::init(session_id, self.now(), payload.to_vec()))
            .await;
        self.settle().await;
        self.bob
            .flows
            .flows()
            .last()
            .cloned()
            .expect("counterparty flow started")
    }

    /// Move the injected clock and the tokio clock together. Needs a paused runtime.
    pub async fn advance(&self, millis: u64) {
        self.clock.advance(millis);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        tokio::task::yield_now().await;
    }
}
