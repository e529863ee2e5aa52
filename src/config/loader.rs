//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Environment override for `exchange.interface`
pub const ENV_INTERFACE: &str = "QOS_EXCHANGE_INTERFACE";

/// Environment override for `exchange.stall_timeout_ms`
pub const ENV_STALL_TIMEOUT_MS: &str = "QOS_EXCHANGE_STALL_TIMEOUT_MS";

/// Environment override for `log.level`
pub const ENV_LOG_LEVEL: &str = "QOS_EXCHANGE_LOG_LEVEL";

/// Load configuration from a JSON file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: interface={}, stall_timeout={}ms",
        config.exchange.interface, config.exchange.stall_timeout_ms
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `QOS_EXCHANGE_INTERFACE`: Override the reset interface
/// - `QOS_EXCHANGE_STALL_TIMEOUT_MS`: Override the stall deadline
/// - `QOS_EXCHANGE_LOG_LEVEL`: Override log level
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or validation fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// Apply overrides from a variable lookup, then re-validate
fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(interface) = lookup(ENV_INTERFACE) {
        config.exchange.interface = interface;
        debug!("Interface overridden to {}", config.exchange.interface);
    }

    if let Some(timeout) = lookup(ENV_STALL_TIMEOUT_MS) {
        config.exchange.stall_timeout_ms = timeout.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_STALL_TIMEOUT_MS.into(),
            reason: format!("Invalid number: {timeout}"),
        })?;
        debug!(
            "Stall timeout overridden to {}ms",
            config.exchange.stall_timeout_ms
        );
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    // Re-validate after overrides
    config.validate()
}

/// Create a default configuration file at the given path
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be written.
pub fn create_default_config(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let config = Config::default_config();
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))?;

    std::fs::write(path, json)?;
    Ok(())
}
