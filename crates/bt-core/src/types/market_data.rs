//! Market data flowing from the tape into the simulation.
//!
//! # Fixed-point convention
//!
//! The tape stores prices and amounts as signed integers scaled by
//! [`PRICE_SCALE`] (1e8). [`from_fixed`] / [`to_fixed`] are the only places
//! that know the scale.

use super::enums::Side;

/// Scale of the tape's fixed-point price and amount fields.
pub const PRICE_SCALE: i64 = 100_000_000;

/// Convert a tape fixed-point integer to a decimal value.
#[inline]
pub fn from_fixed(raw: i64) -> f64 {
    raw as f64 / PRICE_SCALE as f64
}

/// Convert a decimal value to the tape's fixed-point integer (rounded).
#[inline]
pub fn to_fixed(value: f64) -> i64 {
    (value * PRICE_SCALE as f64).round() as i64
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// One historical trade, normalized from a tape record.
///
/// `amount` is consumed in place by the matching engine while the trade is
/// being processed; the remainder is discarded afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// Epoch seconds.
    pub time: i64,
    pub id: u32,
    pub price: f64,
    pub amount: f64,
    /// Aggressor side.
    pub side: Side,
}

impl Trade {
    pub fn new(time: i64, id: u32, price: f64, amount: f64, side: Side) -> Self {
        Self { time, id, price, amount, side }
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade(#{} {} {:.8}x{:.8} id={})",
            self.time, self.side, self.price, self.amount, self.id
        )
    }
}
