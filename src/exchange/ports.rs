//! Collaborator interfaces of the exchange
//!
//! The exchange talks to four outside parties and one scheduler:
//!
//! - [`PolicyConsumer`]: applies and withdraws individual rules
//! - [`ResponseSink`]: receives the aggregate response for the radio side
//! - [`NativePolicyLayer`]: drops every policy on the interface during a reset
//! - [`PendingWorkHook`]: flushes queued work addressed to discarded dialogs
//! - [`ExchangeScheduler`]: posts continuations and stall checks onto the
//!   serial context that owns the controller
//!
//! CRITICAL: implementations are invoked from inside the serial context.
//! They MUST NOT block on the exchange (e.g. await a snapshot), and any
//! outcome they produce must be posted back through an `ExchangeHandle`
//! rather than fed into the controller directly.
//!
//! No-op and recording implementations are provided for tests and tools.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::supervisor::StallCheck;
use crate::policy::{PolicyDescriptor, PolicyResponse, RuleId};

/// Downstream network-policy consumer
pub trait PolicyConsumer: Send + Sync {
    /// Apply a rule
    ///
    /// Ok means the request was accepted for asynchronous processing; the
    /// real outcome arrives later through `report_outcome`. Err means the
    /// consumer refused the descriptor outright.
    fn apply_rule(&self, descriptor: &PolicyDescriptor) -> Result<(), String>;

    /// Withdraw a rule (fire-and-forget)
    fn withdraw_rule(&self, rule_id: RuleId);

    /// Withdraw every rule this consumer has applied
    fn withdraw_all(&self);
}

/// Output towards the radio side
pub trait ResponseSink: Send + Sync {
    /// Deliver the aggregate response for one batch
    fn emit_response(&self, response: PolicyResponse);
}

/// Radio/native policy layer
pub trait NativePolicyLayer: Send + Sync {
    /// Remove all policies installed for an interface
    fn remove_all_policies(&self, interface: &str);
}

/// Caller-side bookkeeping of queued policy work
pub trait PendingWorkHook: Send + Sync {
    /// Drop any pending work addressed to discarded dialogs
    fn clear_pending_work(&self);
}

/// Scheduler owned by the serial context
///
/// The controller never calls itself back directly: continuations and
/// stall checks are posted through this trait and delivered later as
/// `dispatch_next` / `on_stall_check` calls.
pub trait ExchangeScheduler: Send + Sync {
    /// Post a "start the next queued batch" continuation
    fn schedule_dispatch(&self);

    /// Arm the stall deadline for a dispatched batch, replacing any armed one
    fn arm_stall_check(&self, check: StallCheck, after: Duration);

    /// Cancel the armed stall deadline, if any
    fn cancel_stall_check(&self);
}

/// Consumer that accepts everything and does nothing
pub struct NoOpPolicyConsumer;

impl PolicyConsumer for NoOpPolicyConsumer {
    fn apply_rule(&self, _descriptor: &PolicyDescriptor) -> Result<(), String> {
        Ok(())
    }

    fn withdraw_rule(&self, _rule_id: RuleId) {}

    fn withdraw_all(&self) {}
}

/// Sink that drops responses
pub struct NoOpResponseSink;

impl ResponseSink for NoOpResponseSink {
    fn emit_response(&self, _response: PolicyResponse) {}
}

/// Native layer that does nothing
pub struct NoOpNativeLayer;

impl NativePolicyLayer for NoOpNativeLayer {
    fn remove_all_policies(&self, _interface: &str) {}
}

/// Pending-work hook that does nothing
pub struct NoOpPendingWorkHook;

impl PendingWorkHook for NoOpPendingWorkHook {
    fn clear_pending_work(&self) {}
}

/// Mock consumer recording every call
///
/// Allows configuring which rule ids are refused synchronously.
#[derive(Default)]
pub struct MockPolicyConsumer {
    applied: Mutex<Vec<PolicyDescriptor>>,
    withdrawn: Mutex<Vec<RuleId>>,
    withdraw_all_calls: AtomicUsize,
    rejections: Mutex<HashSet<RuleId>>,
}

impl MockPolicyConsumer {
    /// Create a new mock consumer
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse `apply_rule` for this rule id
    pub fn reject_rule(&self, rule_id: RuleId) {
        self.rejections.lock().insert(rule_id);
    }

    /// Descriptors passed to `apply_rule`, including refused ones
    pub fn applied(&self) -> Vec<PolicyDescriptor> {
        self.applied.lock().clone()
    }

    /// Rule ids passed to `withdraw_rule`
    pub fn withdrawn(&self) -> Vec<RuleId> {
        self.withdrawn.lock().clone()
    }

    /// Number of `withdraw_all` calls
    pub fn withdraw_all_calls(&self) -> usize {
        self.withdraw_all_calls.load(Ordering::SeqCst)
    }

    /// Total number of calls of any kind
    pub fn total_calls(&self) -> usize {
        self.applied.lock().len() + self.withdrawn.lock().len() + self.withdraw_all_calls()
    }
}

impl PolicyConsumer for MockPolicyConsumer {
    fn apply_rule(&self, descriptor: &PolicyDescriptor) -> Result<(), String> {
        self.applied.lock().push(descriptor.clone());
        if self.rejections.lock().contains(&descriptor.rule_id) {
            return Err(format!("rule {} refused", descriptor.rule_id));
        }
        Ok(())
    }

    fn withdraw_rule(&self, rule_id: RuleId) {
        self.withdrawn.lock().push(rule_id);
    }

    fn withdraw_all(&self) {
        self.withdraw_all_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink collecting every emitted response
#[derive(Default)]
pub struct CollectingResponseSink {
    responses: Mutex<Vec<PolicyResponse>>,
}

impl CollectingResponseSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses emitted so far, in order
    pub fn responses(&self) -> Vec<PolicyResponse> {
        self.responses.lock().clone()
    }

    /// Remove and return the responses emitted so far
    pub fn take(&self) -> Vec<PolicyResponse> {
        std::mem::take(&mut *self.responses.lock())
    }

    /// Number of responses emitted so far
    pub fn len(&self) -> usize {
        self.responses.lock().len()
    }

    /// Check if nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.responses.lock().is_empty()
    }
}

impl ResponseSink for CollectingResponseSink {
    fn emit_response(&self, response: PolicyResponse) {
        self.responses.lock().push(response);
    }
}

/// Reset hooks counting how often each side was asked to clean up
#[derive(Default)]
pub struct CountingResetHooks {
    native_resets: Mutex<Vec<String>>,
    pending_clears: AtomicUsize,
}

impl CountingResetHooks {
    /// Create new counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Interfaces passed to `remove_all_policies`
    pub fn native_resets(&self) -> Vec<String> {
        self.native_resets.lock().clone()
    }

    /// Number of `clear_pending_work` calls
    pub fn pending_clears(&self) -> usize {
        self.pending_clears.load(Ordering::SeqCst)
    }
}

impl NativePolicyLayer for CountingResetHooks {
    fn remove_all_policies(&self, interface: &str) {
        self.native_resets.lock().push(interface.to_string());
    }
}

impl PendingWorkHook for CountingResetHooks {
    fn clear_pending_work(&self) {
        self.pending_clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scheduler that only records requests
///
/// Tests and benches drive the controller by hand: take the posted
/// dispatches and armed checks from here and feed them back.
#[derive(Default)]
pub struct ManualScheduler {
    pending_dispatches: AtomicUsize,
    armed: Mutex<Option<(StallCheck, Duration)>>,
    arm_count: AtomicUsize,
}

impl ManualScheduler {
    /// Create an idle scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the number of posted dispatches, resetting it to zero
    pub fn take_dispatches(&self) -> usize {
        self.pending_dispatches.swap(0, Ordering::SeqCst)
    }

    /// Currently armed stall check and its delay
    pub fn armed(&self) -> Option<(StallCheck, Duration)> {
        *self.armed.lock()
    }

    /// Total number of `arm_stall_check` calls
    pub fn arm_count(&self) -> usize {
        self.arm_count.load(Ordering::SeqCst)
    }
}

impl ExchangeScheduler for ManualScheduler {
    fn schedule_dispatch(&self) {
        self.pending_dispatches.fetch_add(1, Ordering::SeqCst);
    }

    fn arm_stall_check(&self, check: StallCheck, after: Duration) {
        self.arm_count.fetch_add(1, Ordering::SeqCst);
        *self.armed.lock() = Some((check, after));
    }

    fn cancel_stall_check(&self) {
        *self.armed.lock() = None;
    }
}
