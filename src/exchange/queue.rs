//! FIFO of batches waiting to be dispatched

use std::collections::VecDeque;

use crate::policy::PolicyBatch;

/// Batches not yet started, in arrival order
///
/// The batch being processed is never in here: the dispatcher pops it
/// before starting it.
#[derive(Debug, Default)]
pub struct RequestQueue {
    batches: VecDeque<PolicyBatch>,
}

impl RequestQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch
    pub fn push(&mut self, batch: PolicyBatch) {
        self.batches.push_back(batch);
    }

    /// Take the oldest batch
    pub fn pop(&mut self) -> Option<PolicyBatch> {
        self.batches.pop_front()
    }

    /// Drop every queued batch, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.batches.len();
        self.batches.clear();
        dropped
    }

    /// Number of queued batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
