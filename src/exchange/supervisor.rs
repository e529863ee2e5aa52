//! Stall watchdog for the in-flight batch
//!
//! One deadline is armed per dispatched batch. When it fires, the check is
//! live only if the same dispatch is still in flight; otherwise it is a
//! stale timer and is ignored.
//!
//! Dialog tokens are not unique across batches, so a check is keyed by the
//! token plus a per-dispatch sequence number.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ports::ExchangeScheduler;
use crate::policy::DialogToken;

/// Default stall deadline in milliseconds
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 500;

/// Identity of one armed stall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StallCheck {
    /// Dialog of the dispatched batch
    pub dialog_token: DialogToken,
    /// Sequence number of the dispatch
    pub dispatch_seq: u64,
}

/// Arms, cancels and validates stall deadlines
#[derive(Debug)]
pub struct StallSupervisor {
    timeout: Duration,
    armed: Option<StallCheck>,
    next_seq: u64,
}

impl StallSupervisor {
    /// Create a supervisor with the given deadline
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            armed: None,
            next_seq: 0,
        }
    }

    /// Deadline applied to every dispatch
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Currently armed check
    pub fn armed(&self) -> Option<StallCheck> {
        self.armed
    }

    /// Allocate the sequence number for the next dispatch
    pub fn next_dispatch_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Arm the deadline for a dispatch
    pub fn arm(&mut self, check: StallCheck, scheduler: &dyn ExchangeScheduler) {
        trace!(
            dialog_token = check.dialog_token,
            dispatch_seq = check.dispatch_seq,
            timeout_ms = self.timeout.as_millis() as u64,
            "Arming stall deadline"
        );
        self.armed = Some(check);
        scheduler.arm_stall_check(check, self.timeout);
    }

    /// Cancel the armed deadline, if any
    pub fn disarm(&mut self, scheduler: &dyn ExchangeScheduler) {
        if let Some(check) = self.armed.take() {
            trace!(
                dialog_token = check.dialog_token,
                dispatch_seq = check.dispatch_seq,
                "Cancelling stall deadline"
            );
            scheduler.cancel_stall_check();
        }
    }

    /// Consume a fired check
    ///
    /// Returns true if the check matches the armed deadline, in which case
    /// the supervisor is disarmed and the caller must reset.
    pub fn fire(&mut self, check: StallCheck) -> bool {
        if self.armed == Some(check) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}
