//! Exchange flow tests
//!
//! Drives a spawned `ExchangeService` with consumers that answer through
//! an `ExchangeHandle`, the way a real downstream consumer would.
//!
//! # Test Categories
//!
//! 1. **Ordering**: batches run one at a time in submission order
//! 2. **Aggregation**: response contents and the resources flag
//! 3. **Local declines**: duplicates and malformed rules
//! 4. **Consumer changes**: detach and replacement

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use qos_policy_exchange::config::ExchangeConfig;
use qos_policy_exchange::exchange::{
    CollectingResponseSink, ExchangeCollaborators, ExchangeHandle, ExchangeService,
    MockPolicyConsumer, PolicyConsumer,
};
use qos_policy_exchange::policy::{
    ClassifierParams, PolicyBatch, PolicyDescriptor, Protocol, RuleId, RuleOperation, StatusCode,
};
use tokio::task::JoinHandle;

// ============================================================================
// Helpers
// ============================================================================

/// Consumer that answers every applied rule through the exchange handle
struct EchoConsumer {
    handle: ExchangeHandle,
    statuses: HashMap<RuleId, StatusCode>,
    log: Mutex<Vec<String>>,
}

impl EchoConsumer {
    fn new(handle: ExchangeHandle) -> Self {
        Self {
            handle,
            statuses: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn with_status(mut self, rule_id: RuleId, status: StatusCode) -> Self {
        self.statuses.insert(rule_id, status);
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl PolicyConsumer for EchoConsumer {
    fn apply_rule(&self, descriptor: &PolicyDescriptor) -> Result<(), String> {
        self.log.lock().push(format!("apply {}", descriptor.rule_id));
        let status = self
            .statuses
            .get(&descriptor.rule_id)
            .copied()
            .unwrap_or(StatusCode::Success);
        self.handle
            .report_outcome(descriptor.rule_id, status)
            .map_err(|e| e.to_string())
    }

    fn withdraw_rule(&self, rule_id: RuleId) {
        self.log.lock().push(format!("withdraw {rule_id}"));
    }

    fn withdraw_all(&self) {
        self.log.lock().push("withdraw_all".into());
    }
}

struct Fixture {
    handle: ExchangeHandle,
    task: JoinHandle<()>,
    sink: Arc<CollectingResponseSink>,
}

impl Fixture {
    fn spawn() -> Self {
        let sink = Arc::new(CollectingResponseSink::new());
        let (handle, task) = ExchangeService::spawn(
            &ExchangeConfig::default(),
            ExchangeCollaborators::new(sink.clone()),
        );
        Self { handle, task, sink }
    }

    /// Let every posted command and continuation settle
    async fn settle(&self) {
        let mut previous = self.handle.snapshot().await.unwrap();
        loop {
            let current = self.handle.snapshot().await.unwrap();
            if current == previous {
                return;
            }
            previous = current;
        }
    }

    async fn stop(self) {
        self.handle.shutdown().unwrap();
        self.task.await.unwrap();
    }
}

fn add(id: RuleId) -> RuleOperation {
    RuleOperation::add(id, 46, ClassifierParams::any())
}

// ============================================================================
// Ordering Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_batches_complete_in_submission_order() {
    let fixture = Fixture::spawn();
    let consumer = Arc::new(EchoConsumer::new(fixture.handle.clone()));
    fixture.handle.attach_consumer(consumer.clone()).unwrap();

    for token in 1..=3 {
        let first = u8::try_from(token * 10).unwrap();
        fixture
            .handle
            .submit_batch(PolicyBatch::new(token, vec![add(first), add(first + 1)]))
            .unwrap();
    }
    fixture.settle().await;

    let tokens: Vec<_> = fixture.sink.responses().iter().map(|r| r.dialog_token).collect();
    assert_eq!(tokens, vec![1, 2, 3]);
    assert_eq!(
        consumer.log(),
        vec!["apply 10", "apply 11", "apply 20", "apply 21", "apply 30", "apply 31"]
    );

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert!(snapshot.is_idle());
    assert_eq!(snapshot.stats.batches_completed, 3);
    fixture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_batch_not_started_until_first_answers() {
    let fixture = Fixture::spawn();
    let consumer = Arc::new(MockPolicyConsumer::new());
    fixture.handle.attach_consumer(consumer.clone()).unwrap();

    fixture.handle.submit_batch(PolicyBatch::new(1, vec![add(1)])).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(2, vec![add(2)])).unwrap();
    fixture.settle().await;

    let applied: Vec<_> = consumer.applied().iter().map(|d| d.rule_id).collect();
    assert_eq!(applied, vec![1]);

    fixture.handle.report_outcome(1, StatusCode::Success).unwrap();
    fixture.settle().await;

    let applied: Vec<_> = consumer.applied().iter().map(|d| d.rule_id).collect();
    assert_eq!(applied, vec![1, 2]);
    fixture.stop().await;
}

// ============================================================================
// Aggregation Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_insufficient_resources_clears_flag() {
    let fixture = Fixture::spawn();
    let consumer = Arc::new(
        EchoConsumer::new(fixture.handle.clone()).with_status(2, StatusCode::InsufficientResources),
    );
    fixture.handle.attach_consumer(consumer).unwrap();

    fixture
        .handle
        .submit_batch(PolicyBatch::new(7, vec![add(1), add(2), add(3)]))
        .unwrap();
    fixture.settle().await;

    let responses = fixture.sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].resources_available);
    assert_eq!(responses[0].outcomes.len(), 3);
    assert_eq!(responses[0].status_of(2), Some(StatusCode::InsufficientResources));
    assert_eq!(responses[0].status_of(3), Some(StatusCode::Success));
    fixture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_descriptor_fields_reach_consumer() {
    let fixture = Fixture::spawn();
    let consumer = Arc::new(MockPolicyConsumer::new());
    fixture.handle.attach_consumer(consumer.clone()).unwrap();

    let classifier = ClassifierParams {
        dst_ip: Some("192.0.2.10".parse().unwrap()),
        dst_port: Some(5060),
        protocol: Protocol::Udp,
        ..ClassifierParams::any()
    };
    fixture
        .handle
        .submit_batch(PolicyBatch::new(1, vec![RuleOperation::add(4, 46, classifier)]))
        .unwrap();
    fixture.settle().await;

    let applied = consumer.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].dscp, 46);
    assert_eq!(applied[0].protocol, Protocol::Udp);
    assert_eq!(applied[0].dst_ports.map(|r| (r.start, r.end)), Some((5060, 5060)));
    fixture.stop().await;
}

// ============================================================================
// Local Decline Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_batch_answered_without_consumer() {
    let fixture = Fixture::spawn();
    let consumer = Arc::new(MockPolicyConsumer::new());
    fixture.handle.attach_consumer(consumer.clone()).unwrap();

    fixture
        .handle
        .submit_batch(PolicyBatch::new(3, vec![add(1), add(1)]))
        .unwrap();
    fixture.settle().await;

    assert_eq!(consumer.total_calls(), 0);
    let responses = fixture.sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(responses[0]
        .outcomes
        .iter()
        .all(|o| o.status == StatusCode::RequestDeclined));
    fixture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_and_remove_only_batches() {
    let fixture = Fixture::spawn();
    let consumer = Arc::new(MockPolicyConsumer::new());
    fixture.handle.attach_consumer(consumer.clone()).unwrap();

    fixture.handle.submit_batch(PolicyBatch::new(1, vec![])).unwrap();
    fixture
        .handle
        .submit_batch(PolicyBatch::new(2, vec![RuleOperation::remove(9)]))
        .unwrap();
    fixture.settle().await;

    let responses = fixture.sink.responses();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.outcomes.is_empty() && r.resources_available));
    assert_eq!(consumer.withdrawn(), vec![9]);
    fixture.stop().await;
}

// ============================================================================
// Consumer Change Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_detach_then_reattach() {
    let fixture = Fixture::spawn();
    fixture.handle.attach_consumer(Arc::new(MockPolicyConsumer::new())).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(1, vec![add(1)])).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(2, vec![add(2)])).unwrap();

    fixture.handle.detach_consumer().unwrap();
    // Late outcome for the discarded batch
    fixture.handle.report_outcome(1, StatusCode::Success).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(3, vec![add(3)])).unwrap();

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert!(!snapshot.consumer_attached);
    assert!(snapshot.is_idle());
    assert!(fixture.sink.is_empty());

    let consumer = Arc::new(EchoConsumer::new(fixture.handle.clone()));
    fixture.handle.attach_consumer(consumer).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(4, vec![add(4)])).unwrap();
    fixture.settle().await;

    let tokens: Vec<_> = fixture.sink.responses().iter().map(|r| r.dialog_token).collect();
    assert_eq!(tokens, vec![4]);
    fixture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_replacement_consumer_takes_queued_batches() {
    let fixture = Fixture::spawn();
    let silent = Arc::new(MockPolicyConsumer::new());
    fixture.handle.attach_consumer(silent.clone()).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(1, vec![add(1)])).unwrap();
    fixture.handle.submit_batch(PolicyBatch::new(2, vec![add(2)])).unwrap();

    let echo = Arc::new(EchoConsumer::new(fixture.handle.clone()));
    fixture.handle.attach_consumer(echo.clone()).unwrap();
    fixture.settle().await;

    // Batch 1 was in flight on the old consumer and is gone
    let tokens: Vec<_> = fixture.sink.responses().iter().map(|r| r.dialog_token).collect();
    assert_eq!(tokens, vec![2]);
    assert_eq!(echo.log(), vec!["apply 2"]);
    assert_eq!(silent.applied().len(), 1);

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.stats.batches_discarded, 1);
    fixture.stop().await;
}
