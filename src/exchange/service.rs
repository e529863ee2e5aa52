//! Tokio host for the exchange controller
//!
//! All controller calls happen inside one background task fed by an
//! unbounded command channel. Callers hold an [`ExchangeHandle`] and post
//! commands; nothing touches the controller concurrently.
//!
//! # Architecture
//!
//! ```text
//! ExchangeHandle ──┐
//! ExchangeHandle ──┼──> mpsc ──> exchange task ──> ExchangeController
//!                  │      ▲
//! TokioScheduler ──┘      │ DispatchNext / StallCheck (weak sender)
//! ```
//!
//! The scheduler and its stall timers only hold a weak sender, so the task
//! ends once every handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::controller::{ExchangeCollaborators, ExchangeController};
use super::diagnostics::ExchangeSnapshot;
use super::ports::{ExchangeScheduler, PolicyConsumer};
use super::supervisor::StallCheck;
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::policy::{PolicyBatch, RuleId, StatusCode};

/// Commands processed by the exchange task
pub enum ExchangeCommand {
    /// Attach, replace or (with `None`) detach the consumer
    AttachConsumer(Option<Arc<dyn PolicyConsumer>>),
    /// Queue a batch
    SubmitBatch(PolicyBatch),
    /// Record a consumer outcome
    ReportOutcome {
        /// Rule the outcome is for
        rule_id: RuleId,
        /// Reported status
        status: StatusCode,
    },
    /// Start the next queued batch if idle
    DispatchNext,
    /// A stall deadline elapsed
    StallCheck(StallCheck),
    /// Dump the exchange state
    Snapshot(oneshot::Sender<ExchangeSnapshot>),
    /// Stop the task
    Shutdown,
}

/// Scheduler posting back into the exchange task
pub struct TokioScheduler {
    sender: mpsc::WeakUnboundedSender<ExchangeCommand>,
    /// Sleeper task of the armed stall deadline
    stall_task: Mutex<Option<JoinHandle<()>>>,
}

impl TokioScheduler {
    fn new(sender: mpsc::WeakUnboundedSender<ExchangeCommand>) -> Self {
        Self {
            sender,
            stall_task: Mutex::new(None),
        }
    }

    fn post(sender: &mpsc::WeakUnboundedSender<ExchangeCommand>, command: ExchangeCommand) {
        match sender.upgrade() {
            Some(tx) => {
                // Closed means the task is already gone
                let _ = tx.send(command);
            }
            None => trace!("Exchange task gone, dropping scheduled command"),
        }
    }
}

impl ExchangeScheduler for TokioScheduler {
    fn schedule_dispatch(&self) {
        Self::post(&self.sender, ExchangeCommand::DispatchNext);
    }

    fn arm_stall_check(&self, check: StallCheck, after: Duration) {
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            Self::post(&sender, ExchangeCommand::StallCheck(check));
        });

        if let Some(previous) = self.stall_task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel_stall_check(&self) {
        if let Some(handle) = self.stall_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_stall_check();
    }
}

/// Cloneable handle to a running exchange
///
/// Every method only posts a command. Errors raised by the controller are
/// logged by the task, not returned here; the only error a caller sees is
/// `ServiceClosed`.
#[derive(Clone)]
pub struct ExchangeHandle {
    sender: mpsc::UnboundedSender<ExchangeCommand>,
}

impl ExchangeHandle {
    fn send(&self, command: ExchangeCommand) -> Result<(), ExchangeError> {
        self.sender
            .send(command)
            .map_err(|_| ExchangeError::ServiceClosed)
    }

    /// Attach or replace the consumer
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ServiceClosed` if the task has stopped.
    pub fn attach_consumer(&self, consumer: Arc<dyn PolicyConsumer>) -> Result<(), ExchangeError> {
        self.send(ExchangeCommand::AttachConsumer(Some(consumer)))
    }

    /// Detach the consumer, discarding all exchange state
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ServiceClosed` if the task has stopped.
    pub fn detach_consumer(&self) -> Result<(), ExchangeError> {
        self.send(ExchangeCommand::AttachConsumer(None))
    }

    /// Submit a batch
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ServiceClosed` if the task has stopped.
    pub fn submit_batch(&self, batch: PolicyBatch) -> Result<(), ExchangeError> {
        self.send(ExchangeCommand::SubmitBatch(batch))
    }

    /// Report an outcome for a rule of the batch in flight
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ServiceClosed` if the task has stopped.
    pub fn report_outcome(&self, rule_id: RuleId, status: StatusCode) -> Result<(), ExchangeError> {
        self.send(ExchangeCommand::ReportOutcome { rule_id, status })
    }

    /// Dump the exchange state
    ///
    /// The snapshot reflects every command posted before this call.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ServiceClosed` if the task has stopped.
    pub async fn snapshot(&self) -> Result<ExchangeSnapshot, ExchangeError> {
        let (tx, rx) = oneshot::channel();
        self.send(ExchangeCommand::Snapshot(tx))?;
        rx.await.map_err(|_| ExchangeError::ServiceClosed)
    }

    /// Ask the task to stop
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::ServiceClosed` if the task has already stopped.
    pub fn shutdown(&self) -> Result<(), ExchangeError> {
        self.send(ExchangeCommand::Shutdown)
    }

    /// Check if the task has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Spawner for the exchange task
pub struct ExchangeService;

impl ExchangeService {
    /// Spawn the exchange task on the current runtime
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use qos_policy_exchange::config::ExchangeConfig;
    /// use qos_policy_exchange::exchange::{
    ///     ExchangeCollaborators, ExchangeService, MockPolicyConsumer, NoOpResponseSink,
    /// };
    /// use qos_policy_exchange::policy::PolicyBatch;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let collaborators = ExchangeCollaborators::new(Arc::new(NoOpResponseSink));
    /// let (handle, task) = ExchangeService::spawn(&ExchangeConfig::default(), collaborators);
    ///
    /// handle.attach_consumer(Arc::new(MockPolicyConsumer::new()))?;
    /// handle.submit_batch(PolicyBatch::new(1, vec![]))?;
    ///
    /// handle.shutdown()?;
    /// task.await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(
        config: &ExchangeConfig,
        collaborators: ExchangeCollaborators,
    ) -> (ExchangeHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Arc::new(TokioScheduler::new(sender.downgrade()));
        let controller = ExchangeController::new(config, collaborators, scheduler);

        info!(
            interface = %config.interface,
            stall_timeout_ms = config.stall_timeout_ms,
            "Starting policy exchange"
        );
        let task = tokio::spawn(Self::run(controller, receiver));
        (ExchangeHandle { sender }, task)
    }

    async fn run(
        mut controller: ExchangeController,
        mut receiver: mpsc::UnboundedReceiver<ExchangeCommand>,
    ) {
        while let Some(command) = receiver.recv().await {
            match command {
                ExchangeCommand::AttachConsumer(consumer) => controller.attach_consumer(consumer),
                ExchangeCommand::SubmitBatch(batch) => {
                    let dialog_token = batch.dialog_token;
                    if let Err(e) = controller.submit_batch(batch) {
                        log_rejected("submit_batch", &e);
                        debug!(dialog_token, "Policy batch dropped");
                    }
                }
                ExchangeCommand::ReportOutcome { rule_id, status } => {
                    if let Err(e) = controller.report_outcome(rule_id, status) {
                        log_rejected("report_outcome", &e);
                    }
                }
                ExchangeCommand::DispatchNext => controller.dispatch_next(),
                ExchangeCommand::StallCheck(check) => controller.on_stall_check(check),
                ExchangeCommand::Snapshot(reply) => {
                    // Receiver may have given up
                    let _ = reply.send(controller.snapshot());
                }
                ExchangeCommand::Shutdown => {
                    debug!("Shutdown requested");
                    break;
                }
            }
        }

        // Drops pending work and cancels the stall deadline
        controller.attach_consumer(None);
        let stats = controller.stats();
        info!(
            submitted = stats.batches_submitted,
            completed = stats.batches_completed,
            discarded = stats.batches_discarded,
            stall_resets = stats.stall_resets,
            "Policy exchange stopped"
        );
    }
}

fn log_rejected(operation: &str, error: &ExchangeError) {
    match error {
        ExchangeError::NoConsumerAttached => {
            debug!(operation, "Ignored: {}", error);
        }
        _ => warn!(operation, "Ignored: {}", error),
    }
}
