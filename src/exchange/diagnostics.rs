//! Counters and read-only snapshots of the exchange
//!
//! Nothing here feeds back into protocol decisions; it exists for dumps
//! and tests.

use serde::{Deserialize, Serialize};

use crate::policy::DialogToken;

/// Lifetime counters of an exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeStats {
    /// Batches accepted into the queue
    pub batches_submitted: u64,
    /// Batches answered with an aggregate response
    pub batches_completed: u64,
    /// Batches dropped without a response (detach, consumer swap, stall)
    pub batches_discarded: u64,
    /// Stall resets performed
    pub stall_resets: u64,
    /// Rules declined without consumer involvement
    pub local_declines: u64,
    /// Outcomes accepted from the consumer
    pub consumer_outcomes: u64,
    /// Outcomes ignored (no batch in flight, unexpected rule id)
    pub ignored_outcomes: u64,
}

/// State of the batch being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightSnapshot {
    /// Dialog being processed
    pub dialog_token: DialogToken,
    /// Outcomes the batch needs
    pub expected_outcomes: usize,
    /// Outcomes collected so far
    pub collected_outcomes: usize,
    /// False once any rule reported insufficient resources
    pub resources_available: bool,
}

/// Point-in-time dump of the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSnapshot {
    /// Whether a consumer is attached
    pub consumer_attached: bool,
    /// Batches waiting behind the one in flight
    pub queue_depth: usize,
    /// Batch being processed, if any
    pub in_flight: Option<InFlightSnapshot>,
    /// Lifetime counters
    pub stats: ExchangeStats,
}

impl ExchangeSnapshot {
    /// Check if no batch is in flight and nothing is queued
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue_depth == 0
    }

    /// Serialize to a single JSON line
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
