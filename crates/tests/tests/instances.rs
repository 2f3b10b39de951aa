//! Real instance processes talking through the router.

use std::path::Path;

use contracts::{InstanceExit, RunError};
use tests::run_instances;

const RING: &str = env!("CARGO_BIN_EXE_ring");
const SUM_INPUT: &str = env!("CARGO_BIN_EXE_sum_input");
const DEADLOCK: &str = env!("CARGO_BIN_EXE_deadlock");
const LEAKY: &str = env!("CARGO_BIN_EXE_leaky");

#[tokio::test]
async fn test_ring_counter_visits_every_instance() {
    let outcome = run_instances(Path::new(RING), 6, b"").await.unwrap();
    assert!(outcome.result.is_success(), "{:?}", outcome.result.error);
    assert_eq!(outcome.stdout_of(0), "6\n");
    for i in 1..6 {
        assert_eq!(outcome.stdout_of(i), "");
    }

    for stats in &outcome.result.instances {
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 8);
        assert_eq!(stats.exit, Some(InstanceExit::Code(0)));
    }
    assert!(outcome.result.remaining.is_empty());
}

#[tokio::test]
async fn test_single_instance_ring() {
    let outcome = run_instances(Path::new(RING), 1, b"").await.unwrap();
    assert!(outcome.result.is_success());
    assert_eq!(outcome.stdout_of(0), "1\n");
}

#[tokio::test]
async fn test_broadcast_input_and_gather() {
    let input: String = (1..=100).map(|i| format!("{i}\n")).collect();
    let outcome = run_instances(Path::new(SUM_INPUT), 7, input.as_bytes())
        .await
        .unwrap();

    assert!(outcome.result.is_success(), "{:?}", outcome.result.error);
    assert_eq!(outcome.stdout_of(0), "5050\n");
    assert_eq!(outcome.result.instances[0].messages_sent, 0);
    for stats in &outcome.result.instances[1..] {
        assert_eq!(stats.messages_sent, 1);
    }
}

#[tokio::test]
async fn test_waiting_cycle_is_reported_as_deadlock() {
    let outcome = run_instances(Path::new(DEADLOCK), 3, b"").await.unwrap();
    match outcome.result.error {
        Some(RunError::Deadlock { blocked }) => assert_eq!(blocked, vec![0, 1, 2]),
        other => panic!("expected deadlock, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreceived_messages_are_orphans() {
    let outcome = run_instances(Path::new(LEAKY), 4, b"").await.unwrap();
    assert!(outcome.result.is_success(), "{:?}", outcome.result.error);

    let by_destination = outcome.result.remaining.by_destination();
    assert_eq!(by_destination.len(), 1);
    assert_eq!(by_destination[&0], vec![1, 2, 3]);
    assert_eq!(outcome.result.remaining.len(), 3);
}

#[tokio::test]
async fn test_many_instances() {
    let outcome = run_instances(Path::new(RING), 40, b"").await.unwrap();
    assert!(outcome.result.is_success(), "{:?}", outcome.result.error);
    assert_eq!(outcome.stdout_of(0), "40\n");
    assert_eq!(outcome.result.instances.len(), 40);
}
