//! # bt-core
//!
//! Core crate for the trade-tape backtester, providing:
//!
//! - **Types** (`types`): sides, trades, orders, margin positions
//! - **Tolerance** (`approx`): the shared `1e-5` zero / equality test
//! - **Configuration** (`config`): JSON config with per-strategy defaults
//! - **Error types** (`error`): fatal run conditions as `SimError` via thiserror
//! - **Logging** (`logging`): tracing-based structured logging

pub mod approx;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
