//! Per-rule outcomes and the aggregate response

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{DialogToken, RuleId};

/// Status reported for a single rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Rule applied
    Success,
    /// Rule refused
    RequestDeclined,
    /// Classifier cannot be enforced by the consumer
    ClassifierNotSupported,
    /// Consumer ran out of resources
    InsufficientResources,
    /// Rule to remove was not known
    PolicyNotFound,
    /// Rule was removed
    Deleted,
}

impl StatusCode {
    /// Stable numeric code for the radio side
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::RequestDeclined => 1,
            Self::ClassifierNotSupported => 2,
            Self::InsufficientResources => 3,
            Self::PolicyNotFound => 4,
            Self::Deleted => 5,
        }
    }

    /// Parse a numeric status code
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::RequestDeclined),
            2 => Some(Self::ClassifierNotSupported),
            3 => Some(Self::InsufficientResources),
            4 => Some(Self::PolicyNotFound),
            5 => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::RequestDeclined => write!(f, "request_declined"),
            Self::ClassifierNotSupported => write!(f, "classifier_not_supported"),
            Self::InsufficientResources => write!(f, "insufficient_resources"),
            Self::PolicyNotFound => write!(f, "policy_not_found"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Outcome of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Rule identifier
    pub rule_id: RuleId,
    /// Reported status
    pub status: StatusCode,
}

impl RuleOutcome {
    /// Create a new outcome
    #[must_use]
    pub const fn new(rule_id: RuleId, status: StatusCode) -> Self {
        Self { rule_id, status }
    }

    /// A locally produced decline
    #[must_use]
    pub const fn declined(rule_id: RuleId) -> Self {
        Self::new(rule_id, StatusCode::RequestDeclined)
    }
}

/// Aggregate answer covering every outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    /// Dialog being answered
    pub dialog_token: DialogToken,
    /// False if any rule reported insufficient resources
    pub resources_available: bool,
    /// Outcomes in arrival order
    pub outcomes: Vec<RuleOutcome>,
}

impl PolicyResponse {
    /// Look up the status reported for a rule
    #[must_use]
    pub fn status_of(&self, rule_id: RuleId) -> Option<StatusCode> {
        self.outcomes
            .iter()
            .find(|o| o.rule_id == rule_id)
            .map(|o| o.status)
    }
}
