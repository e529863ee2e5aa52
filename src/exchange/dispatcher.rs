//! Translation of one batch into consumer calls
//!
//! # Dispatch rules
//!
//! 1. **Duplicate rule ids**: the whole batch is declined locally, one
//!    `RequestDeclined` per operation, and the consumer is never called
//! 2. **REMOVE**: `withdraw_rule` is called; no outcome is awaited
//! 3. **ADD with an invalid classifier**: declined locally
//! 4. **ADD whose descriptor cannot be built**: declined locally
//! 5. **ADD refused synchronously by the consumer**: declined locally
//! 6. **Other ADDs**: handed to the consumer; the outcome arrives later
//!
//! Local declines settle the same expected slots as consumer outcomes, so
//! a batch made only of declines completes without consumer involvement.

use std::fmt;

use tracing::{debug, warn};

use super::ports::PolicyConsumer;
use crate::policy::{
    ClassifierParams, PolicyBatch, PolicyDescriptor, RuleId, RuleOperation, RuleOutcome,
};

/// Why a rule was declined without consumer involvement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineReason {
    /// The batch contained the same rule id more than once
    DuplicateRuleId,
    /// The classifier was flagged invalid by the parser
    InvalidClassifier,
    /// The descriptor was malformed or the consumer refused it
    ConsumerRejected(String),
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateRuleId => write!(f, "duplicate rule id in batch"),
            Self::InvalidClassifier => write!(f, "invalid classifier"),
            Self::ConsumerRejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// Result of dispatching one batch
#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    /// Rule ids that owe an outcome (multiset)
    pub expected_ids: Vec<RuleId>,
    /// Outcomes produced locally, to be recorded right away
    pub local_declines: Vec<RuleOutcome>,
}

/// Issues the consumer calls for a batch
pub struct Dispatcher<'a> {
    consumer: &'a dyn PolicyConsumer,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher bound to a consumer
    pub fn new(consumer: &'a dyn PolicyConsumer) -> Self {
        Self { consumer }
    }

    /// Dispatch every operation of a batch in order
    pub fn dispatch(&self, batch: &PolicyBatch) -> DispatchPlan {
        if batch.has_duplicate_rule_ids() {
            warn!(
                dialog_token = batch.dialog_token,
                operations = batch.len(),
                "Declining batch: {}",
                DeclineReason::DuplicateRuleId
            );
            let expected_ids: Vec<RuleId> = batch.rule_ids().collect();
            let local_declines = expected_ids.iter().map(|&id| RuleOutcome::declined(id)).collect();
            return DispatchPlan {
                expected_ids,
                local_declines,
            };
        }

        let mut plan = DispatchPlan {
            expected_ids: batch.outcome_bearing_ids().collect(),
            local_declines: Vec::new(),
        };

        for op in &batch.operations {
            match op {
                RuleOperation::Remove { rule_id } => {
                    debug!(dialog_token = batch.dialog_token, rule_id, "Withdrawing rule");
                    self.consumer.withdraw_rule(*rule_id);
                }
                RuleOperation::Add {
                    rule_id,
                    dscp,
                    classifier,
                } => {
                    if let Err(reason) = self.apply(*rule_id, *dscp, classifier) {
                        debug!(
                            dialog_token = batch.dialog_token,
                            rule_id,
                            reason = %reason,
                            "Declining rule locally"
                        );
                        plan.local_declines.push(RuleOutcome::declined(*rule_id));
                    }
                }
            }
        }

        plan
    }

    fn apply(
        &self,
        rule_id: RuleId,
        dscp: u8,
        classifier: &ClassifierParams,
    ) -> Result<(), DeclineReason> {
        if !classifier.is_valid {
            return Err(DeclineReason::InvalidClassifier);
        }

        let descriptor = PolicyDescriptor::build(rule_id, dscp, classifier)
            .map_err(|e| DeclineReason::ConsumerRejected(e.to_string()))?;

        debug!(rule_id, dscp, protocol = %descriptor.protocol, "Applying rule");
        self.consumer
            .apply_rule(&descriptor)
            .map_err(DeclineReason::ConsumerRejected)
    }
}
