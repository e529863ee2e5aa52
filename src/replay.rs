//! Scripted replay of an exchange session
//!
//! A script is a JSON array of [`ReplayEvent`]s. Events are posted to a
//! freshly spawned [`ExchangeService`] in order; responses and dumps are
//! collected as [`ReplayOutput`] lines.
//!
//! ```json
//! [
//!   { "type": "attach", "consumer": "qos-hal" },
//!   { "type": "submit", "dialog_token": 7, "operations": [
//!       { "op": "add", "rule_id": 1, "dscp": 46, "classifier": { "is_valid": true } }
//!   ] },
//!   { "type": "outcome", "rule_id": 1, "status": "success" },
//!   { "type": "dump" }
//! ]
//! ```
//!
//! Consumers are named: attaching the same name twice re-attaches the same
//! handle, a new name replaces the consumer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::error::{ConfigError, ExchangeError, QosExchangeError};
use crate::exchange::{
    ExchangeCollaborators, ExchangeHandle, ExchangeService, ExchangeSnapshot, NativePolicyLayer,
    PendingWorkHook, PolicyConsumer, ResponseSink,
};
use crate::policy::{
    DialogToken, PolicyBatch, PolicyDescriptor, PolicyResponse, RuleId, RuleOperation, StatusCode,
};

/// One step of a replay script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// Attach the named consumer
    Attach {
        /// Consumer name
        consumer: String,
    },
    /// Detach the consumer
    Detach,
    /// Submit a batch
    Submit {
        /// Dialog token of the batch
        dialog_token: DialogToken,
        /// Operations in order
        #[serde(default)]
        operations: Vec<RuleOperation>,
    },
    /// Report a consumer outcome
    Outcome {
        /// Rule the outcome is for
        rule_id: RuleId,
        /// Reported status
        status: StatusCode,
    },
    /// Let time pass
    Wait {
        /// Milliseconds to sleep
        ms: u64,
    },
    /// Record a snapshot of the exchange
    Dump,
}

/// One line of replay output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayOutput {
    /// A response emitted by the exchange
    Response(PolicyResponse),
    /// A requested snapshot
    Dump(ExchangeSnapshot),
    /// A stall reset reached the native layer
    Reset {
        /// Interface passed to the native layer
        interface: String,
    },
}

impl ReplayOutput {
    /// Serialize to a single JSON line
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Consumer used by replays
///
/// Accepts every rule; outcomes come from the script.
pub struct ReplayConsumer {
    name: String,
    applied: Mutex<Vec<RuleId>>,
}

impl ReplayConsumer {
    /// Create a named consumer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Consumer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rule ids passed to `apply_rule`
    pub fn applied(&self) -> Vec<RuleId> {
        self.applied.lock().clone()
    }
}

impl PolicyConsumer for ReplayConsumer {
    fn apply_rule(&self, descriptor: &PolicyDescriptor) -> Result<(), String> {
        debug!(
            consumer = %self.name,
            rule_id = descriptor.rule_id,
            dscp = descriptor.dscp,
            "Replay consumer applying rule"
        );
        self.applied.lock().push(descriptor.rule_id);
        Ok(())
    }

    fn withdraw_rule(&self, rule_id: RuleId) {
        debug!(consumer = %self.name, rule_id, "Replay consumer withdrawing rule");
    }

    fn withdraw_all(&self) {
        info!(consumer = %self.name, "Replay consumer withdrawing all rules");
    }
}

/// Ordered record of everything a replay produced
#[derive(Default)]
struct ReplayLog {
    lines: Mutex<Vec<ReplayOutput>>,
}

impl ReplayLog {
    fn push(&self, line: ReplayOutput) {
        self.lines.lock().push(line);
    }

    fn take(&self) -> Vec<ReplayOutput> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl ResponseSink for ReplayLog {
    fn emit_response(&self, response: PolicyResponse) {
        self.push(ReplayOutput::Response(response));
    }
}

impl NativePolicyLayer for ReplayLog {
    fn remove_all_policies(&self, interface: &str) {
        self.push(ReplayOutput::Reset {
            interface: interface.to_string(),
        });
    }
}

impl PendingWorkHook for ReplayLog {
    fn clear_pending_work(&self) {
        debug!("Replay: pending work cleared");
    }
}

/// Parse a replay script
///
/// # Errors
///
/// Returns `ConfigError::ParseError` if the JSON is malformed.
pub fn parse_script(json: &str) -> Result<Vec<ReplayEvent>, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(format!("Invalid script: {e}")))
}

/// Load a replay script from a file
///
/// # Errors
///
/// Returns `ConfigError` if the file is missing, unreadable or malformed.
pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<ReplayEvent>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    parse_script(&contents)
}

/// Run a script against a fresh exchange
///
/// Returns every output line in the order it was produced. Dumps and
/// waits first let pending continuations run, and all events are fully
/// processed before this returns.
///
/// # Errors
///
/// Returns `QosExchangeError::Exchange` if the exchange task stops early.
pub async fn run_script(
    config: &ExchangeConfig,
    events: Vec<ReplayEvent>,
) -> Result<Vec<ReplayOutput>, QosExchangeError> {
    let log = Arc::new(ReplayLog::default());
    let collaborators = ExchangeCollaborators::new(log.clone())
        .with_native_layer(log.clone())
        .with_pending_work_hook(log.clone());
    let (handle, task) = ExchangeService::spawn(config, collaborators);

    let mut consumers: HashMap<String, Arc<ReplayConsumer>> = HashMap::new();
    info!(events = events.len(), "Replaying script");

    for event in events {
        match event {
            ReplayEvent::Attach { consumer } => {
                let consumer = consumers
                    .entry(consumer)
                    .or_insert_with_key(|name| Arc::new(ReplayConsumer::new(name.clone())))
                    .clone();
                handle.attach_consumer(consumer)?;
            }
            ReplayEvent::Detach => handle.detach_consumer()?,
            ReplayEvent::Submit {
                dialog_token,
                operations,
            } => handle.submit_batch(PolicyBatch::new(dialog_token, operations))?,
            ReplayEvent::Outcome { rule_id, status } => handle.report_outcome(rule_id, status)?,
            ReplayEvent::Wait { ms } => {
                // Let queued commands land before the clock moves
                settle(&handle).await?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            ReplayEvent::Dump => {
                let snapshot = settle(&handle).await?;
                log.push(ReplayOutput::Dump(snapshot));
            }
        }
    }

    settle(&handle).await?;
    handle.shutdown()?;
    if let Err(e) = task.await {
        warn!(error = %e, "Exchange task ended abnormally");
    }

    Ok(log.take())
}

/// Snapshot once every posted continuation has run
///
/// Two identical consecutive snapshots mean nothing was processed in
/// between, so no continuation is pending.
async fn settle(handle: &ExchangeHandle) -> Result<ExchangeSnapshot, ExchangeError> {
    let mut previous = handle.snapshot().await?;
    loop {
        let current = handle.snapshot().await?;
        if current == previous {
            return Ok(current);
        }
        previous = current;
    }
}
