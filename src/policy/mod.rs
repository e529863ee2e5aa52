//! Policy data model
//!
//! Types exchanged between the radio side, the exchange core and the
//! downstream policy consumer.
//!
//! # Submodules
//!
//! - [`types`]: batches and rule operations as requested by the radio side
//! - [`outcome`]: per-rule status codes and the aggregate response
//! - [`descriptor`]: consumer-facing DSCP policy descriptors

pub mod descriptor;
pub mod outcome;
pub mod types;

pub use descriptor::{is_valid_dscp, PolicyDescriptor, DSCP_MAX};
pub use outcome::{PolicyResponse, RuleOutcome, StatusCode};
pub use types::{
    ClassifierParams, DialogToken, OperationKind, PolicyBatch, PortRange, Protocol, RuleId,
    RuleOperation,
};
