//! Batched policy request/response exchange
//!
//! Sits between a caller that submits batches of rule operations and a
//! downstream consumer that applies rules one at a time and reports each
//! outcome asynchronously.
//!
//! # Components
//!
//! - [`RequestQueue`]: FIFO of batches not yet started
//! - [`Dispatcher`]: turns one batch into consumer calls and local declines
//! - [`StatusAggregator`]: collects outcomes for the batch in flight
//! - [`StallSupervisor`]: arms and validates the per-batch stall deadline
//! - [`ExchangeController`]: the state machine tying them together
//! - [`ExchangeService`]: hosts the controller on a tokio task
//!
//! # Guarantees
//!
//! - One batch in flight at a time, started in submission order
//! - Exactly one response per completed batch, none for discarded ones
//! - A stalled batch triggers one full policy reset

mod aggregator;
mod controller;
mod diagnostics;
mod dispatcher;
mod ports;
mod queue;
mod service;
mod supervisor;

pub use aggregator::StatusAggregator;
pub use controller::{ExchangeCollaborators, ExchangeController, ExchangeState};
pub use diagnostics::{ExchangeSnapshot, ExchangeStats, InFlightSnapshot};
pub use dispatcher::{DeclineReason, DispatchPlan, Dispatcher};
pub use ports::{
    CollectingResponseSink, CountingResetHooks, ExchangeScheduler, ManualScheduler,
    MockPolicyConsumer, NativePolicyLayer, NoOpNativeLayer, NoOpPendingWorkHook,
    NoOpPolicyConsumer, NoOpResponseSink, PendingWorkHook, PolicyConsumer, ResponseSink,
};
pub use queue::RequestQueue;
pub use service::{ExchangeCommand, ExchangeHandle, ExchangeService, TokioScheduler};
pub use supervisor::{StallCheck, StallSupervisor, DEFAULT_STALL_TIMEOUT_MS};
