//! Session choreography across two nodes.
//!
//! Alice opens sessions, Bob answers. The transport between them is driven
//! by hand so messages can be lost, reordered or duplicated.

use super::harness::Network;
use proptest::prelude::*;
use qc_18_session_manager::{SessionManagerApi, SessionManagerConfig, SessionStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_bus::RecordPublisher;
use shared_types::{
    error_types, FlowEvent, Record, RecordValue, SessionEvent, SessionPayload, StateLookup, Topic,
};
use std::collections::BTreeSet;

fn payloads(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[tokio::test]
async fn test_open_and_exchange_in_order() {
    let net = Network::new();
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;

    assert_eq!(net.bob.flows.payloads(&bob_flow), payloads(&["hello"]));
    let alice = net.alice.session("s1").await.unwrap();
    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Confirmed);
    assert_eq!(bob.status, SessionStatus::Confirmed);
    assert_eq!(bob.flow_id.as_deref(), Some(bob_flow.as_str()));

    net.alice
        .send("alice-flow", SessionEvent::data("s1", net.now(), b"a".to_vec()))
        .await;
    net.alice
        .send("alice-flow", SessionEvent::data("s1", net.now(), b"b".to_vec()))
        .await;
    net.bob
        .send(&bob_flow, SessionEvent::data("s1-INITIATED", net.now(), b"x".to_vec()))
        .await;
    net.settle().await;

    assert_eq!(net.bob.flows.payloads(&bob_flow), payloads(&["hello", "a", "b"]));
    assert_eq!(net.alice.flows.payloads("alice-flow"), payloads(&["x"]));

    let alice = net.alice.session("s1").await.unwrap();
    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert!(alice.send_events_state.undelivered_messages.is_empty());
    assert!(bob.send_events_state.undelivered_messages.is_empty());
    assert_eq!(bob.receive_events_state.last_contiguous_sequence_received, Some(3));
}

#[tokio::test]
async fn test_each_side_keys_by_its_own_session_id() {
    let net = Network::new();
    net.open("s1", "alice-flow", b"hello").await;

    assert!(net.alice.session("s1-INITIATED").await.is_none());
    assert!(net.bob.session("s1").await.is_none());
    assert!(net.alice.mapper_state("s1").await.is_known());
    assert!(net.bob.mapper_state("s1-INITIATED").await.is_known());
    assert!(!net.bob.sent_to("s1").is_empty());
    assert!(!net.alice.sent_to("s1-INITIATED").is_empty());
}

// =============================================================================
// UNRELIABLE TRANSPORT
// =============================================================================

#[tokio::test]
async fn test_reordered_and_duplicated_delivery_is_exactly_once() {
    let net = Network::new();
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;

    for item in ["d1", "d2", "d3", "d4", "d5"] {
        net.alice
            .send("alice-flow", SessionEvent::data("s1", net.now(), item.as_bytes().to_vec()))
            .await;
    }
    net.alice.step().await;
    let mut wire = net.alice.outbound();
    assert_eq!(wire.len(), 5);

    wire.reverse();
    let duplicates = wire.clone();
    wire.extend(duplicates);
    net.bob.receive(wire).await;
    net.settle().await;

    assert_eq!(
        net.bob.flows.payloads(&bob_flow),
        payloads(&["hello", "d1", "d2", "d3", "d4", "d5"])
    );
    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert_eq!(bob.receive_events_state.last_contiguous_sequence_received, Some(6));
    assert!(bob.receive_events_state.out_of_order_messages.is_empty());
    let alice = net.alice.session("s1").await.unwrap();
    assert!(alice.send_events_state.undelivered_messages.is_empty());
}

#[tokio::test]
async fn test_lost_message_is_recovered_by_resend() {
    let config = SessionManagerConfig::default();
    let resend_window = config.message_resend_window_ms;
    let net = Network::with_config(config);
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;

    net.alice
        .send("alice-flow", SessionEvent::data("s1", net.now(), b"lost".to_vec()))
        .await;
    net.alice
        .send("alice-flow", SessionEvent::data("s1", net.now(), b"kept".to_vec()))
        .await;
    net.alice.step().await;
    let wire = net.alice.outbound();
    net.bob.receive(wire[1..].to_vec()).await;
    net.settle().await;

    // seq 3 waits in Bob's buffer until seq 2 shows up
    assert_eq!(net.bob.flows.payloads(&bob_flow), payloads(&["hello"]));
    let alice = net.alice.session("s1").await.unwrap();
    assert_eq!(alice.send_events_state.undelivered_messages.len(), 2);

    net.clock.advance(resend_window);
    let resent = net.alice.sessions.housekeep(&["s1".to_string()]).await.unwrap();
    assert!(!resent.is_empty());
    net.settle().await;

    assert_eq!(net.bob.flows.payloads(&bob_flow), payloads(&["hello", "lost", "kept"]));
    let alice = net.alice.session("s1").await.unwrap();
    assert!(alice.send_events_state.undelivered_messages.is_empty());
}

#[tokio::test]
async fn test_replayed_init_opens_nothing_new() {
    let net = Network::new();
    net.open("s1", "alice-flow", b"hello").await;
    let init = net
        .alice
        .sent_to("s1-INITIATED")
        .into_iter()
        .find(|e| e.kind() == shared_types::EventKind::Init)
        .unwrap();

    net.bob
        .receive(vec![Record::new(
            Topic::P2POut,
            "s1-INITIATED",
            RecordValue::Session(init),
        )])
        .await;
    net.settle().await;

    assert_eq!(net.bob.flows.flows().len(), 1);
    assert_eq!(net.bob.flows.payloads(&net.bob.flows.flows()[0]).len(), 1);
}

#[tokio::test]
async fn test_lossy_transport_converges_with_resends() {
    let config = SessionManagerConfig::default();
    let resend_window = config.message_resend_window_ms;
    let net = Network::with_config(config);
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;
    let mut rng = StdRng::seed_from_u64(7);

    let items: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    for item in &items {
        net.alice
            .send("alice-flow", SessionEvent::data("s1", net.now(), item.clone()))
            .await;
    }

    for _ in 0..50 {
        net.alice.step().await;
        net.bob.step().await;
        let to_bob: Vec<Record> = net
            .alice
            .outbound()
            .into_iter()
            .filter(|_| rng.gen_bool(0.7))
            .collect();
        let to_alice: Vec<Record> = net
            .bob
            .outbound()
            .into_iter()
            .filter(|_| rng.gen_bool(0.7))
            .collect();
        net.bob.receive(to_bob).await;
        net.alice.receive(to_alice).await;

        let alice = net.alice.session("s1").await.unwrap();
        if alice.send_events_state.undelivered_messages.is_empty() {
            break;
        }
        net.clock.advance(resend_window);
        net.alice.sessions.housekeep(&["s1".to_string()]).await.unwrap();
    }

    let mut expected = vec![b"hello".to_vec()];
    expected.extend(items);
    assert_eq!(net.bob.flows.payloads(&bob_flow), expected);
    let alice = net.alice.session("s1").await.unwrap();
    assert!(alice.send_events_state.undelivered_messages.is_empty());
    assert_eq!(alice.status, SessionStatus::Confirmed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_arrival_order_delivers_once_in_order(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
        repeats in prop::collection::vec(0..6usize, 0..6),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let delivered = runtime.block_on(async {
            let net = Network::new();
            let bob_flow = net.open("s1", "alice-flow", b"hello").await;
            for i in 0..6 {
                net.alice
                    .send("alice-flow", SessionEvent::data("s1", net.now(), vec![i]))
                    .await;
            }
            net.alice.step().await;
            let wire = net.alice.outbound();

            let arrivals: Vec<Record> = order
                .iter()
                .chain(repeats.iter())
                .map(|&i| wire[i].clone())
                .collect();
            net.bob.receive(arrivals).await;
            net.settle().await;
            net.bob.flows.payloads(&bob_flow)
        });

        let mut expected = vec![b"hello".to_vec()];
        expected.extend((0..6u8).map(|i| vec![i]));
        prop_assert_eq!(delivered, expected);
    }
}

// =============================================================================
// STRAY AND FAILING SESSIONS
// =============================================================================

#[tokio::test]
async fn test_ack_for_unknown_session_fails_back_to_counterparty() {
    let net = Network::new();
    let ack = SessionEvent::ack("ghost", net.now(), 1, BTreeSet::new());
    net.bob
        .log
        .publish(Record::new(
            Topic::FlowEvent,
            "ghost-flow",
            RecordValue::FlowEvent(FlowEvent {
                flow_id: "ghost-flow".into(),
                event: ack,
            }),
        ))
        .await
        .unwrap();
    net.bob.step().await;

    let state = net.bob.session("ghost-INITIATED").await.unwrap();
    assert_eq!(state.status, SessionStatus::Error);
    let errors = net.bob.flows.errors("ghost-flow");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, error_types::ACK_NULL_STATE);

    let sent = net.bob.sent_to("ghost");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].session_id, "ghost-INITIATED");
    assert!(matches!(sent[0].payload, SessionPayload::Error { .. }));

    // Alice never heard of "ghost": the error is dropped, not bounced back.
    net.settle().await;
    assert_eq!(net.alice.mapper_state("ghost").await, StateLookup::Unknown);
    assert!(net.alice.session("ghost").await.is_none());
    assert!(net.alice.sent_to("ghost-INITIATED").is_empty());
}

#[tokio::test]
async fn test_stray_data_is_errored_back_by_mapper() {
    let net = Network::new();
    let stray = SessionEvent::data("nobody", net.now(), b"?".to_vec()).with_sequence_num(Some(3));
    net.bob
        .receive(vec![Record::new(
            Topic::P2POut,
            "nobody-INITIATED",
            RecordValue::Session(stray),
        )])
        .await;
    net.settle().await;

    let sent = net.bob.sent_to("nobody");
    assert_eq!(sent.len(), 1);
    let SessionPayload::Error { error } = &sent[0].payload else {
        panic!("expected error, got {:?}", sent[0].payload);
    };
    assert_eq!(error.error_type, error_types::MAPPER_UNKNOWN_SESSION);
    assert_eq!(
        net.bob.sessions.get_state("nobody-INITIATED").await.unwrap(),
        StateLookup::Unknown
    );
    assert!(net.bob.flows.deliveries().is_empty());
    assert_eq!(net.alice.mapper_state("nobody").await, StateLookup::Unknown);
}

#[tokio::test(start_paused = true)]
async fn test_counterparty_error_fails_both_sides() {
    let net = Network::new();
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;

    let error = shared_types::ErrorEnvelope::new("Flow-Failed", "boom");
    net.bob
        .send(&bob_flow, SessionEvent::error("s1-INITIATED", net.now(), error.clone()))
        .await;
    net.settle().await;

    let alice = net.alice.session("s1").await.unwrap();
    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Error);
    assert_eq!(bob.status, SessionStatus::Error);
    assert_eq!(net.alice.flows.errors("alice-flow"), vec![error]);
    // cleanup is requested at once; the timer may already have run
    match net.alice.mapper_state("s1").await {
        StateLookup::Known(state) => assert!(state.is_closing()),
        lookup => assert_eq!(lookup, StateLookup::Tombstoned),
    }
}

#[tokio::test]
async fn test_silent_session_times_out_on_both_sides() {
    let config = SessionManagerConfig::default();
    let timeout = config.session_timeout_ms;
    let net = Network::with_config(config);
    let bob_flow = net.open("s1", "alice-flow", b"hello").await;

    net.clock.advance(timeout + 1);
    net.alice.sessions.housekeep(&["s1".to_string()]).await.unwrap();
    net.settle().await;

    let alice = net.alice.session("s1").await.unwrap();
    assert_eq!(alice.status, SessionStatus::Error);
    assert_eq!(
        net.alice.flows.errors("alice-flow")[0].error_type,
        error_types::SESSION_TIMEOUT
    );

    let bob = net.bob.session("s1-INITIATED").await.unwrap();
    assert_eq!(bob.status, SessionStatus::Error);
    assert_eq!(net.bob.flows.errors(&bob_flow)[0].error_type, error_types::SESSION_TIMEOUT);
}
