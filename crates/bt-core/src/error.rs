//! Typed error definitions for the simulator.
//!
//! Provides [`SimError`] for the conditions that end a run. Soft rejections
//! (insufficient balance at order creation) are not errors and never appear
//! here. All variants implement `std::error::Error` via `thiserror`, so they
//! integrate seamlessly with `anyhow::Result` in the runner.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{OrderId, Side};

/// Fatal conditions for a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Tape file could not be opened or read.
    #[error("tape {}: {source}", path.display())]
    Tape { path: PathBuf, source: std::io::Error },

    /// A trade arrived with a timestamp earlier than the simulation clock.
    #[error("trade time went backwards: clock at #{clock}, trade at #{time}")]
    NonMonotonicTime { clock: i64, time: i64 },

    /// A single fill would flip a margin position from long to short or back.
    #[error("position would change side at #{time}: amount {before} -> {after}")]
    PositionFlip { time: i64, before: f64, after: f64 },

    /// The exchange reported an execution the strategy was not waiting for.
    #[error("executed order {got} does not match expected order {expected:?}")]
    ExecutedMismatch { expected: Option<OrderId>, got: OrderId },

    /// The exchange variant does not support canceling this side.
    #[error("cancel of {side} order {id} is not supported by this exchange")]
    UnsupportedCancel { side: Side, id: OrderId },

    /// Any other state that should be unreachable.
    #[error("invariant violated: {0}")]
    Invariant(String),
}
