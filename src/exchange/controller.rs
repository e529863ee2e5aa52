//! `ExchangeController` - the policy exchange state machine
//!
//! The controller owns all mutable exchange state and is driven from a
//! single serial context. It never calls itself back: continuations
//! ("start the next batch") and stall checks are posted through the
//! [`ExchangeScheduler`] and come back as [`ExchangeController::dispatch_next`]
//! and [`ExchangeController::on_stall_check`].
//!
//! # Lifecycle of a batch
//!
//! ```text
//! submit_batch ──> RequestQueue ──(idle)──> Dispatcher ──> consumer
//!                                               │
//!                        local declines ────────┤
//!                                               ▼
//! report_outcome ──────────────────────> StatusAggregator
//!                                               │ complete
//!                                               ▼
//!                    emit_response, cancel stall, post dispatch_next
//! ```
//!
//! If the stall deadline fires first, the batch is dropped without a
//! response, the queue is emptied and every policy is reset.
//!
//! # Invariants
//!
//! - At most one batch is in flight; the queue is not drained while it is
//! - A response is emitted at most once per dispatched batch, and never
//!   for a discarded one
//! - Without a consumer nothing is queued or in flight

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::aggregator::StatusAggregator;
use super::diagnostics::{ExchangeSnapshot, ExchangeStats, InFlightSnapshot};
use super::dispatcher::Dispatcher;
use super::ports::{
    ExchangeScheduler, NativePolicyLayer, NoOpNativeLayer, NoOpPendingWorkHook, PendingWorkHook,
    PolicyConsumer, ResponseSink,
};
use super::queue::RequestQueue;
use super::supervisor::{StallCheck, StallSupervisor};
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::policy::{DialogToken, PolicyBatch, RuleId, RuleOutcome, StatusCode};

/// Outside parties the controller reports to
#[derive(Clone)]
pub struct ExchangeCollaborators {
    /// Receives aggregate responses
    pub sink: Arc<dyn ResponseSink>,
    /// Asked to drop all policies during a stall reset
    pub native: Arc<dyn NativePolicyLayer>,
    /// Asked to flush pending work during a stall reset
    pub pending_work: Arc<dyn PendingWorkHook>,
}

impl ExchangeCollaborators {
    /// Collaborators with no-op reset hooks
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            sink,
            native: Arc::new(NoOpNativeLayer),
            pending_work: Arc::new(NoOpPendingWorkHook),
        }
    }

    /// Set the native policy layer
    pub fn with_native_layer(mut self, native: Arc<dyn NativePolicyLayer>) -> Self {
        self.native = native;
        self
    }

    /// Set the pending-work hook
    pub fn with_pending_work_hook(mut self, hook: Arc<dyn PendingWorkHook>) -> Self {
        self.pending_work = hook;
        self
    }
}

/// Mutable exchange state
///
/// `in_flight` is `Some` exactly while a batch is being processed.
#[derive(Default)]
pub struct ExchangeState {
    consumer: Option<Arc<dyn PolicyConsumer>>,
    queue: RequestQueue,
    in_flight: Option<StatusAggregator>,
}

fn same_consumer(a: &Arc<dyn PolicyConsumer>, b: &Arc<dyn PolicyConsumer>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// The policy exchange state machine
pub struct ExchangeController {
    state: ExchangeState,
    interface: String,
    supervisor: StallSupervisor,
    collaborators: ExchangeCollaborators,
    scheduler: Arc<dyn ExchangeScheduler>,
    stats: ExchangeStats,
}

impl ExchangeController {
    /// Create an idle controller with no consumer attached
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use qos_policy_exchange::config::ExchangeConfig;
    /// use qos_policy_exchange::exchange::{
    ///     CollectingResponseSink, ExchangeCollaborators, ExchangeController, ManualScheduler,
    /// };
    ///
    /// let sink = Arc::new(CollectingResponseSink::new());
    /// let controller = ExchangeController::new(
    ///     &ExchangeConfig::default(),
    ///     ExchangeCollaborators::new(sink),
    ///     Arc::new(ManualScheduler::new()),
    /// );
    /// assert!(!controller.consumer_attached());
    /// ```
    pub fn new(
        config: &ExchangeConfig,
        collaborators: ExchangeCollaborators,
        scheduler: Arc<dyn ExchangeScheduler>,
    ) -> Self {
        Self {
            state: ExchangeState::default(),
            interface: config.interface.clone(),
            supervisor: StallSupervisor::new(config.stall_timeout()),
            collaborators,
            scheduler,
            stats: ExchangeStats::default(),
        }
    }

    /// Whether a consumer is attached
    pub fn consumer_attached(&self) -> bool {
        self.state.consumer.is_some()
    }

    /// Number of batches waiting behind the one in flight
    pub fn queue_depth(&self) -> usize {
        self.state.queue.len()
    }

    /// Dialog of the batch in flight
    pub fn in_flight_token(&self) -> Option<DialogToken> {
        self.state.in_flight.as_ref().map(StatusAggregator::dialog_token)
    }

    /// Lifetime counters
    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    /// Replace the downstream consumer
    ///
    /// - `None` tears everything down: queue and in-flight batch are
    ///   dropped without responses and the stall deadline is cancelled
    /// - A different handle drops only the in-flight batch; queued batches
    ///   are kept and go to the new consumer
    /// - The same handle again is a no-op
    pub fn attach_consumer(&mut self, consumer: Option<Arc<dyn PolicyConsumer>>) {
        let previous = self.state.consumer.clone();
        match (previous, consumer) {
            (None, None) => {
                debug!("Consumer already detached");
            }
            (Some(_), None) => {
                let dropped = self.state.queue.clear();
                let discarded = self.discard_in_flight();
                self.stats.batches_discarded += dropped as u64;
                self.state.consumer = None;
                info!(
                    dropped_queued = dropped,
                    dropped_in_flight = discarded,
                    "Consumer detached, exchange state cleared"
                );
            }
            (Some(current), Some(next)) if same_consumer(&current, &next) => {
                trace!("Same consumer re-attached");
            }
            (Some(_), Some(next)) => {
                let discarded = self.discard_in_flight();
                self.state.consumer = Some(next);
                warn!(
                    dropped_in_flight = discarded,
                    queued = self.state.queue.len(),
                    "Consumer replaced under an active exchange"
                );
                if !self.state.queue.is_empty() {
                    self.scheduler.schedule_dispatch();
                }
            }
            (None, Some(next)) => {
                info!("Consumer attached");
                self.state.consumer = Some(next);
            }
        }
    }

    /// Queue a batch and start it if the exchange is idle
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::NoConsumerAttached` if there is no consumer;
    /// the batch is dropped.
    pub fn submit_batch(&mut self, batch: PolicyBatch) -> Result<(), ExchangeError> {
        if self.state.consumer.is_none() {
            return Err(ExchangeError::NoConsumerAttached);
        }

        debug!(
            dialog_token = batch.dialog_token,
            operations = batch.len(),
            busy = self.state.in_flight.is_some(),
            "Policy batch queued"
        );
        self.stats.batches_submitted += 1;
        self.state.queue.push(batch);
        self.start_next();
        Ok(())
    }

    /// Record an outcome reported by the consumer
    ///
    /// # Errors
    ///
    /// - `NoConsumerAttached` - no consumer is attached
    /// - `NoBatchInFlight` - nothing is waiting for outcomes
    /// - `UnexpectedOutcome` - the in-flight batch owes nothing for this rule
    ///
    /// In every error case the outcome is dropped.
    pub fn report_outcome(
        &mut self,
        rule_id: RuleId,
        status: StatusCode,
    ) -> Result<(), ExchangeError> {
        if self.state.consumer.is_none() {
            return Err(ExchangeError::NoConsumerAttached);
        }

        let Some(aggregator) = self.state.in_flight.as_mut() else {
            self.stats.ignored_outcomes += 1;
            return Err(ExchangeError::NoBatchInFlight { rule_id });
        };

        if let Err(e) = aggregator.record(RuleOutcome::new(rule_id, status)) {
            self.stats.ignored_outcomes += 1;
            return Err(e);
        }

        trace!(
            dialog_token = aggregator.dialog_token(),
            rule_id,
            status = %status,
            collected = aggregator.collected_count(),
            expected = aggregator.expected_count(),
            "Outcome recorded"
        );
        self.stats.consumer_outcomes += 1;
        self.complete_if_done();
        Ok(())
    }

    /// Posted continuation: start the next queued batch if idle
    pub fn dispatch_next(&mut self) {
        self.start_next();
    }

    /// Handle a fired stall deadline
    ///
    /// A check that no longer matches the armed deadline is stale and
    /// ignored. Otherwise the in-flight batch is dropped without a
    /// response, the queue is emptied and all policies are reset.
    pub fn on_stall_check(&mut self, check: StallCheck) {
        if !self.supervisor.fire(check) {
            debug!(
                dialog_token = check.dialog_token,
                dispatch_seq = check.dispatch_seq,
                "Ignoring stale stall check"
            );
            return;
        }

        let stalled = self.state.in_flight.take();
        let dropped = self.state.queue.clear();
        if let Some(aggregator) = &stalled {
            warn!(
                dialog_token = aggregator.dialog_token(),
                collected = aggregator.collected_count(),
                expected = aggregator.expected_count(),
                dropped_queued = dropped,
                "Policy batch stalled, resetting all policies"
            );
        }

        self.stats.stall_resets += 1;
        self.stats.batches_discarded += dropped as u64 + u64::from(stalled.is_some());

        self.collaborators.pending_work.clear_pending_work();
        self.collaborators.native.remove_all_policies(&self.interface);
        if let Some(consumer) = &self.state.consumer {
            consumer.withdraw_all();
        }
    }

    /// Read-only dump of the exchange
    pub fn snapshot(&self) -> ExchangeSnapshot {
        ExchangeSnapshot {
            consumer_attached: self.consumer_attached(),
            queue_depth: self.state.queue.len(),
            in_flight: self.state.in_flight.as_ref().map(|a| InFlightSnapshot {
                dialog_token: a.dialog_token(),
                expected_outcomes: a.expected_count(),
                collected_outcomes: a.collected_count(),
                resources_available: a.resources_available(),
            }),
            stats: self.stats,
        }
    }

    fn start_next(&mut self) {
        if self.state.in_flight.is_some() {
            return;
        }
        let Some(consumer) = self.state.consumer.clone() else {
            return;
        };
        let Some(batch) = self.state.queue.pop() else {
            return;
        };

        let dispatch_seq = self.supervisor.next_dispatch_seq();
        info!(
            dialog_token = batch.dialog_token,
            operations = batch.len(),
            queued = self.state.queue.len(),
            "Dispatching policy batch"
        );

        let plan = Dispatcher::new(consumer.as_ref()).dispatch(&batch);
        let mut aggregator =
            StatusAggregator::new(batch.dialog_token, dispatch_seq, plan.expected_ids);
        for outcome in plan.local_declines {
            self.stats.local_declines += 1;
            if let Err(e) = aggregator.record(outcome) {
                warn!(error = %e, "Local decline did not match an expected rule");
            }
        }
        self.state.in_flight = Some(aggregator);

        if !self.complete_if_done() {
            let check = StallCheck {
                dialog_token: batch.dialog_token,
                dispatch_seq,
            };
            self.supervisor.arm(check, self.scheduler.as_ref());
        }
    }

    /// Emit the response if the in-flight batch is complete
    fn complete_if_done(&mut self) -> bool {
        if !self
            .state
            .in_flight
            .as_ref()
            .is_some_and(StatusAggregator::is_complete)
        {
            return false;
        }
        let Some(aggregator) = self.state.in_flight.take() else {
            return false;
        };

        self.supervisor.disarm(self.scheduler.as_ref());
        let response = aggregator.into_response();
        info!(
            dialog_token = response.dialog_token,
            resources_available = response.resources_available,
            outcomes = response.outcomes.len(),
            "Emitting policy response"
        );
        self.stats.batches_completed += 1;
        self.collaborators.sink.emit_response(response);

        if !self.state.queue.is_empty() {
            self.scheduler.schedule_dispatch();
        }
        true
    }

    /// Drop the in-flight batch without a response
    fn discard_in_flight(&mut self) -> bool {
        let Some(aggregator) = self.state.in_flight.take() else {
            return false;
        };
        self.supervisor.disarm(self.scheduler.as_ref());
        self.stats.batches_discarded += 1;
        debug!(
            dialog_token = aggregator.dialog_token(),
            collected = aggregator.collected_count(),
            "In-flight batch discarded"
        );
        true
    }
}
