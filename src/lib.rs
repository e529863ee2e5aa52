//! qos-policy-exchange: batched QoS policy request/response exchange
//!
//! This crate mediates between a radio side that submits dialog-scoped
//! batches of DSCP marking rules and a downstream consumer that applies
//! rules one at a time and reports each outcome asynchronously.
//!
//! # Features
//!
//! - **Serialized batches**: one batch in flight, FIFO queue behind it
//! - **Aggregate responses**: one response per batch once every rule has
//!   an outcome, with a sticky "resources available" flag
//! - **Local declines**: duplicate ids and malformed rules are declined
//!   without consumer involvement
//! - **Stall recovery**: a batch that stops making progress triggers a
//!   full policy reset
//! - **Replay tool**: scripted sessions for debugging
//!
//! # Architecture
//!
//! ```text
//! Radio side ──submit_batch──> ExchangeService ──apply_rule──> PolicyConsumer
//!     ▲                              │    ▲                          │
//!     └──────── emit_response ───────┘    └───── report_outcome ─────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use qos_policy_exchange::config::ExchangeConfig;
//! use qos_policy_exchange::exchange::{
//!     CollectingResponseSink, ExchangeCollaborators, ExchangeService, MockPolicyConsumer,
//! };
//! use qos_policy_exchange::policy::{ClassifierParams, PolicyBatch, RuleOperation, StatusCode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(CollectingResponseSink::new());
//! let (handle, _task) =
//!     ExchangeService::spawn(&ExchangeConfig::default(), ExchangeCollaborators::new(sink.clone()));
//!
//! handle.attach_consumer(Arc::new(MockPolicyConsumer::new()))?;
//! handle.submit_batch(PolicyBatch::new(
//!     7,
//!     vec![RuleOperation::add(1, 46, ClassifierParams::any())],
//! ))?;
//! handle.report_outcome(1, StatusCode::Success)?;
//!
//! handle.snapshot().await?;
//! assert_eq!(sink.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`error`]: Error types
//! - [`exchange`]: Exchange state machine and its tokio host
//! - [`policy`]: Batches, outcomes and descriptors
//! - [`replay`]: Scripted replay of exchange sessions

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod exchange;
pub mod policy;
pub mod replay;

// Re-export commonly used types at the crate root
pub use config::{Config, ExchangeConfig, LogConfig};
pub use error::{ConfigError, DescriptorError, ExchangeError, QosExchangeError};
pub use exchange::{
    ExchangeCollaborators, ExchangeController, ExchangeHandle, ExchangeService, ExchangeSnapshot,
    PolicyConsumer, ResponseSink,
};
pub use policy::{PolicyBatch, PolicyResponse, RuleOperation, RuleOutcome, StatusCode};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
