//! Stall recovery tests
//!
//! A consumer that never answers must not wedge the exchange: after the
//! configured deadline every policy is reset and the exchange is idle.
//! Deadlines of batches that finished, or were discarded, must never fire.

use std::sync::Arc;
use std::time::Duration;

use qos_policy_exchange::config::ExchangeConfig;
use qos_policy_exchange::exchange::{
    CollectingResponseSink, CountingResetHooks, ExchangeCollaborators, ExchangeHandle,
    ExchangeService, MockPolicyConsumer,
};
use qos_policy_exchange::policy::{ClassifierParams, PolicyBatch, RuleId, RuleOperation, StatusCode};
use tokio::time::sleep;

struct Fixture {
    handle: ExchangeHandle,
    sink: Arc<CollectingResponseSink>,
    hooks: Arc<CountingResetHooks>,
    consumer: Arc<MockPolicyConsumer>,
}

fn spawn(stall_timeout_ms: u64) -> Fixture {
    let config = ExchangeConfig {
        interface: "rmnet_data0".into(),
        stall_timeout_ms,
    };
    let sink = Arc::new(CollectingResponseSink::new());
    let hooks = Arc::new(CountingResetHooks::new());
    let collaborators = ExchangeCollaborators::new(sink.clone())
        .with_native_layer(hooks.clone())
        .with_pending_work_hook(hooks.clone());
    let (handle, _task) = ExchangeService::spawn(&config, collaborators);

    let consumer = Arc::new(MockPolicyConsumer::new());
    handle.attach_consumer(consumer.clone()).unwrap();
    Fixture {
        handle,
        sink,
        hooks,
        consumer,
    }
}

fn add(id: RuleId) -> RuleOperation {
    RuleOperation::add(id, 34, ClassifierParams::any())
}

#[tokio::test(start_paused = true)]
async fn test_reset_after_configured_deadline() {
    let fixture = spawn(200);
    fixture.handle.submit_batch(PolicyBatch::new(7, vec![add(1)])).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(8, vec![add(2)])).unwrap();
    fixture.handle.snapshot().await.unwrap();

    sleep(Duration::from_millis(150)).await;
    let before = fixture.handle.snapshot().await.unwrap();
    assert_eq!(before.stats.stall_resets, 0);
    assert_eq!(before.in_flight.map(|f| f.dialog_token), Some(7));

    sleep(Duration::from_millis(100)).await;
    let after = fixture.handle.snapshot().await.unwrap();
    assert_eq!(after.stats.stall_resets, 1);
    assert!(after.is_idle());
    assert!(after.consumer_attached);

    assert!(fixture.sink.is_empty());
    assert_eq!(fixture.hooks.native_resets(), vec!["rmnet_data0".to_string()]);
    assert_eq!(fixture.hooks.pending_clears(), 1);
    assert_eq!(fixture.consumer.withdraw_all_calls(), 1);
    // Batch 8 was dropped with the queue and never dispatched
    assert_eq!(fixture.consumer.applied().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_usable_after_reset() {
    let fixture = spawn(100);
    fixture.handle.submit_batch(PolicyBatch::new(1, vec![add(1)])).unwrap();
    sleep(Duration::from_millis(500)).await;

    // Too late for batch 1
    fixture.handle.report_outcome(1, StatusCode::Success).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(2, vec![add(1)])).unwrap();
    fixture.handle.report_outcome(1, StatusCode::Success).unwrap();

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert!(snapshot.is_idle());
    assert_eq!(snapshot.stats.stall_resets, 1);
    assert_eq!(snapshot.stats.ignored_outcomes, 1);

    let tokens: Vec<_> = fixture.sink.responses().iter().map(|r| r.dialog_token).collect();
    assert_eq!(tokens, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_reused_token_does_not_inherit_old_deadline() {
    let fixture = spawn(300);
    fixture.handle.submit_batch(PolicyBatch::new(5, vec![add(1)])).unwrap();
    fixture.handle.snapshot().await.unwrap();

    sleep(Duration::from_millis(200)).await;
    fixture.handle.report_outcome(1, StatusCode::Success).unwrap();
    // Same token, never answered
    fixture.handle.submit_batch(PolicyBatch::new(5, vec![add(2)])).unwrap();
    fixture.handle.snapshot().await.unwrap();

    // The first deadline would have fired here
    sleep(Duration::from_millis(150)).await;
    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stats.stall_resets, 0);
    assert_eq!(snapshot.in_flight.map(|f| f.dialog_token), Some(5));

    sleep(Duration::from_millis(200)).await;
    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stats.stall_resets, 1);
    assert_eq!(fixture.sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detach_cancels_deadline() {
    let fixture = spawn(100);
    fixture.handle.submit_batch(PolicyBatch::new(1, vec![add(1)])).unwrap();
    fixture.handle.detach_consumer().unwrap();

    sleep(Duration::from_secs(1)).await;
    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stats.stall_resets, 0);
    assert_eq!(fixture.hooks.pending_clears(), 0);
    assert_eq!(fixture.consumer.withdraw_all_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_one_reset_per_stall() {
    let fixture = spawn(100);
    for token in 0..3 {
        fixture.handle.submit_batch(PolicyBatch::new(token, vec![add(1)])).unwrap();
    }

    sleep(Duration::from_secs(2)).await;
    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stats.stall_resets, 1);
    assert_eq!(snapshot.stats.batches_discarded, 3);
    assert_eq!(fixture.hooks.native_resets().len(), 1);
}
