//! Trading strategies.
//!
//! Strategies never touch exchange balances directly. They read the state
//! they need and act by scheduling `CreateOrder` / `CancelOrder` events.

pub mod grid;
pub mod momentum;

pub use grid::GridBot;
pub use momentum::MomentumBot;
