//! Outcome aggregation for the batch in flight
//!
//! The aggregator knows which rule ids still owe an outcome. Each outcome
//! settles exactly one expected id; the batch is complete once nothing is
//! owed. Insufficient resources latch for the whole batch.

use std::collections::HashMap;

use crate::error::ExchangeError;
use crate::policy::{DialogToken, PolicyResponse, RuleId, RuleOutcome, StatusCode};

/// State of the single batch being processed
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    dialog_token: DialogToken,
    dispatch_seq: u64,
    expected_count: usize,
    /// Remaining outcomes owed per rule id
    owed: HashMap<RuleId, usize>,
    collected: Vec<RuleOutcome>,
    resources_available: bool,
}

impl StatusAggregator {
    /// Start aggregating for a dispatch
    ///
    /// `expected_ids` is a multiset: an id listed twice owes two outcomes.
    pub fn new(
        dialog_token: DialogToken,
        dispatch_seq: u64,
        expected_ids: impl IntoIterator<Item = RuleId>,
    ) -> Self {
        let mut owed: HashMap<RuleId, usize> = HashMap::new();
        let mut expected_count = 0;
        for id in expected_ids {
            *owed.entry(id).or_default() += 1;
            expected_count += 1;
        }

        Self {
            dialog_token,
            dispatch_seq,
            expected_count,
            owed,
            collected: Vec::with_capacity(expected_count),
            resources_available: true,
        }
    }

    /// Dialog being aggregated
    pub fn dialog_token(&self) -> DialogToken {
        self.dialog_token
    }

    /// Sequence number of the dispatch that created this aggregator
    pub fn dispatch_seq(&self) -> u64 {
        self.dispatch_seq
    }

    /// Number of outcomes the batch needs
    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Number of outcomes collected so far
    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }

    /// False once any rule reported insufficient resources
    pub fn resources_available(&self) -> bool {
        self.resources_available
    }

    /// Check if every expected outcome has arrived
    pub fn is_complete(&self) -> bool {
        self.collected.len() == self.expected_count
    }

    /// Record one outcome
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::UnexpectedOutcome` if the rule owes no
    /// outcome (unknown id or already answered). The outcome is dropped.
    pub fn record(&mut self, outcome: RuleOutcome) -> Result<(), ExchangeError> {
        let Some(remaining) = self.owed.get_mut(&outcome.rule_id) else {
            return Err(ExchangeError::UnexpectedOutcome {
                dialog_token: self.dialog_token,
                rule_id: outcome.rule_id,
            });
        };

        *remaining -= 1;
        if *remaining == 0 {
            self.owed.remove(&outcome.rule_id);
        }

        if outcome.status == StatusCode::InsufficientResources {
            self.resources_available = false;
        }
        self.collected.push(outcome);
        Ok(())
    }

    /// Build the aggregate response
    pub fn into_response(self) -> PolicyResponse {
        PolicyResponse {
            dialog_token: self.dialog_token,
            resources_available: self.resources_available,
            outcomes: self.collected,
        }
    }
}
