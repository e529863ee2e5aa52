//! Integration tests for qos-policy-exchange
//!
//! These tests drive the exchange through its public API only.
//!
//! # Test Organization
//!
//! - `exchange_flow`: batch ordering, aggregation and consumer changes
//!   through a spawned `ExchangeService`
//! - `stall_recovery`: stall deadlines, resets and stale timers
//! - `replay_script`: end-to-end replay scripts
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests stall
//! ```
//!
//! All tests run on tokio's paused clock, so stall deadlines elapse
//! instantly and deterministically.

mod exchange_flow;
mod replay_script;
mod stall_recovery;
