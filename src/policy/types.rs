//! Core request types for policy batches
//!
//! This module defines what the radio side sends us:
//! - [`RuleOperation`]: one requested ADD or REMOVE
//! - [`ClassifierParams`]: traffic classifier attached to an ADD
//! - [`PortRange`]: inclusive destination port range
//! - [`PolicyBatch`]: a dialog-scoped, ordered list of operations

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;

/// Identifier of a single rule, unique within one batch
pub type RuleId = u8;

/// Identifier of one request/response dialog
pub type DialogToken = i32;

/// Kind of a rule operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Install or replace a marking rule
    Add,
    /// Withdraw a marking rule
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Transport protocol matched by a classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Match any protocol
    #[default]
    Any,
    /// TCP (IANA 6)
    Tcp,
    /// UDP (IANA 17)
    Udp,
    /// ESP (IANA 50)
    Esp,
}

impl Protocol {
    /// IANA protocol number, 0 for "any"
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Self::Any => 0,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Esp => 50,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Esp => write!(f, "esp"),
        }
    }
}

/// A range of destination ports
///
/// Both bounds are inclusive. Deserialization does not check ordering;
/// an inverted range is caught when the descriptor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    /// Start of the range (inclusive)
    pub start: u16,
    /// End of the range (inclusive)
    pub end: u16,
}

impl PortRange {
    /// Create a new port range
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::InvalidPortRange` if start > end.
    ///
    /// # Examples
    ///
    /// ```
    /// use qos_policy_exchange::policy::PortRange;
    ///
    /// let range = PortRange::new(5000, 5010).unwrap();
    /// assert!(range.contains(5005));
    /// assert!(PortRange::new(10, 5).is_err());
    /// ```
    pub fn new(start: u16, end: u16) -> Result<Self, DescriptorError> {
        if start > end {
            return Err(DescriptorError::InvalidPortRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a range for a single port
    #[must_use]
    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Check if a port is within this range
    #[must_use]
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Check the range is not inverted
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Classifier attached to an ADD operation
///
/// `is_valid` is decided by whoever parsed the request; the exchange does
/// not second-guess classifier semantics beyond building a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// Whether the parser considered the classifier well-formed
    pub is_valid: bool,

    /// Source address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<IpAddr>,

    /// Destination address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<IpAddr>,

    /// Source port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,

    /// Single destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,

    /// Destination port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port_range: Option<PortRange>,

    /// Transport protocol
    #[serde(default)]
    pub protocol: Protocol,
}

impl ClassifierParams {
    /// A valid classifier with no constraints
    #[must_use]
    pub fn any() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    /// A classifier the parser flagged as invalid
    #[must_use]
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// One requested change in a policy batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RuleOperation {
    /// Install a DSCP marking rule
    Add {
        /// Rule identifier
        rule_id: RuleId,
        /// DSCP value to mark matching traffic with
        dscp: u8,
        /// Traffic classifier
        classifier: ClassifierParams,
    },
    /// Withdraw a previously installed rule
    Remove {
        /// Rule identifier
        rule_id: RuleId,
    },
}

impl RuleOperation {
    /// Shorthand for an ADD operation
    #[must_use]
    pub const fn add(rule_id: RuleId, dscp: u8, classifier: ClassifierParams) -> Self {
        Self::Add {
            rule_id,
            dscp,
            classifier,
        }
    }

    /// Shorthand for a REMOVE operation
    #[must_use]
    pub const fn remove(rule_id: RuleId) -> Self {
        Self::Remove { rule_id }
    }

    /// Rule identifier this operation targets
    #[must_use]
    pub const fn rule_id(&self) -> RuleId {
        match self {
            Self::Add { rule_id, .. } | Self::Remove { rule_id } => *rule_id,
        }
    }

    /// Kind of this operation
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Add { .. } => OperationKind::Add,
            Self::Remove { .. } => OperationKind::Remove,
        }
    }

    /// Whether the consumer is expected to report an outcome for this operation
    ///
    /// Withdrawals are fire-and-forget, so only ADDs carry an outcome.
    #[must_use]
    pub const fn is_outcome_bearing(&self) -> bool {
        matches!(self, Self::Add { .. })
    }
}

/// A dialog-scoped batch of rule operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBatch {
    /// Dialog this batch belongs to
    pub dialog_token: DialogToken,
    /// Operations in request order
    #[serde(default)]
    pub operations: Vec<RuleOperation>,
}

impl PolicyBatch {
    /// Create a new batch
    #[must_use]
    pub fn new(dialog_token: DialogToken, operations: Vec<RuleOperation>) -> Self {
        Self {
            dialog_token,
            operations,
        }
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the batch has no operations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Rule ids of every operation, in order
    pub fn rule_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.operations.iter().map(RuleOperation::rule_id)
    }

    /// Rule ids of operations that expect an outcome, in order
    pub fn outcome_bearing_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.operations
            .iter()
            .filter(|op| op.is_outcome_bearing())
            .map(RuleOperation::rule_id)
    }

    /// Check whether any rule id appears more than once
    ///
    /// # Examples
    ///
    /// ```
    /// use qos_policy_exchange::policy::{PolicyBatch, RuleOperation};
    ///
    /// let batch = PolicyBatch::new(1, vec![RuleOperation::remove(4), RuleOperation::remove(4)]);
    /// assert!(batch.has_duplicate_rule_ids());
    /// ```
    #[must_use]
    pub fn has_duplicate_rule_ids(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.operations.len());
        self.rule_ids().any(|id| !seen.insert(id))
    }
}
