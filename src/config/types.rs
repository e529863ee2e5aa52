//! Configuration types
//!
//! All types are JSON (de)serializable; every field has a default so an
//! empty object is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::exchange::DEFAULT_STALL_TIMEOUT_MS;

/// Longest accepted network interface name
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Upper bound for the stall deadline
pub const MAX_STALL_TIMEOUT_MS: u64 = 60_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Exchange settings
    #[serde(default)]
    pub exchange: ExchangeConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exchange.validate()?;
        self.log.validate()?;
        Ok(())
    }

    /// Create a minimal default configuration
    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }
}

/// Policy exchange settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// Interface passed to the native layer on a stall reset
    #[serde(default = "default_interface")]
    pub interface: String,

    /// How long a dispatched batch may wait for outcomes
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl ExchangeConfig {
    /// Stall deadline as a `Duration`
    #[must_use]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Validate exchange settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an empty or overlong
    /// interface name, or a stall timeout outside `1..=60000` ms.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.is_empty() {
            return Err(ConfigError::ValidationError(
                "exchange.interface must not be empty".into(),
            ));
        }

        if self.interface.len() > MAX_INTERFACE_NAME_LEN {
            return Err(ConfigError::ValidationError(format!(
                "exchange.interface '{}' exceeds {} bytes",
                self.interface, MAX_INTERFACE_NAME_LEN
            )));
        }

        if self.stall_timeout_ms == 0 || self.stall_timeout_ms > MAX_STALL_TIMEOUT_MS {
            return Err(ConfigError::ValidationError(format!(
                "exchange.stall_timeout_ms must be in 1..={MAX_STALL_TIMEOUT_MS}, got {}",
                self.stall_timeout_ms
            )));
        }

        Ok(())
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include target (module path)
    #[serde(default = "default_true")]
    pub target: bool,
}

impl LogConfig {
    /// Validate logging configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an unknown format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "log.format must be 'json' or 'text', got '{other}'"
            ))),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            timestamps: true,
            target: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_stall_timeout_ms() -> u64 {
    DEFAULT_STALL_TIMEOUT_MS
}

fn default_interface() -> String {
    "wlan0".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}
