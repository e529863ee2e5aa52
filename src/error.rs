//! Error types for qos-policy-exchange
//!
//! This module defines the error hierarchy for the policy exchange.
//! Errors are grouped by subsystem and carry recovery hints. None of them
//! is fatal: the worst case in the exchange is a discarded batch followed
//! by a policy reset.

use std::io;

use thiserror::Error;

use crate::policy::{DialogToken, RuleId};

/// Top-level error type for qos-policy-exchange
#[derive(Debug, Error)]
pub enum QosExchangeError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Exchange state machine errors
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Malformed policy descriptor
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl QosExchangeError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Exchange(e) => e.is_recoverable(),
            Self::Descriptor(_) => false,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are generally not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Errors raised by the exchange controller and its serial context
///
/// The controller returns these to the serial context, which logs them.
/// Holders of an `ExchangeHandle` only ever see `ServiceClosed`; every
/// other failure is a logged no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// No downstream policy consumer is attached
    #[error("No policy consumer attached")]
    NoConsumerAttached,

    /// An outcome arrived while no batch was in flight
    #[error("Outcome for rule {rule_id} arrived with no batch in flight")]
    NoBatchInFlight { rule_id: RuleId },

    /// An outcome arrived for a rule the in-flight batch is not waiting on
    #[error("Unexpected outcome for rule {rule_id} in dialog {dialog_token}")]
    UnexpectedOutcome {
        dialog_token: DialogToken,
        rule_id: RuleId,
    },

    /// The serial exchange context has stopped
    #[error("Exchange service is closed")]
    ServiceClosed,
}

impl ExchangeError {
    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::NoConsumerAttached
            | Self::NoBatchInFlight { .. }
            | Self::UnexpectedOutcome { .. } => true,
            Self::ServiceClosed => false,
        }
    }
}

/// Errors raised while building a policy descriptor from an ADD operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// DSCP value does not fit the 6-bit field
    #[error("Invalid DSCP value: {0} (must be 0-63)")]
    InvalidDscp(u8),

    /// Source and destination addresses are of different families
    #[error("Source and destination addresses must be of the same IP family")]
    AddressFamilyMismatch,

    /// Destination port range is inverted
    #[error("Invalid port range: {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },
}

/// Type alias for Result with QosExchangeError
pub type Result<T> = std::result::Result<T, QosExchangeError>;
