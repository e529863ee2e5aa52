//! Configuration module for the policy exchange
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use qos_policy_exchange::config::{load_config, Config};
//!
//! let config = load_config("/etc/qos-policy-exchange/config.json").unwrap();
//! println!("Stall timeout: {}ms", config.exchange.stall_timeout_ms);
//! ```

mod loader;
mod types;

pub use loader::{
    create_default_config, load_config, load_config_str, load_config_with_env, ENV_INTERFACE,
    ENV_LOG_LEVEL, ENV_STALL_TIMEOUT_MS,
};
pub use types::{
    Config, ExchangeConfig, LogConfig, MAX_INTERFACE_NAME_LEN, MAX_STALL_TIMEOUT_MS,
};
