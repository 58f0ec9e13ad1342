//! Trading-related data structures: orders and margin positions.
//!
//! These types flow between the strategy layer and the simulated exchange via
//! the event queue.

use crate::approx::is_zero;
use crate::error::SimError;

use super::enums::{PositionSide, Side};

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Strategy-assigned order identifier, monotonically increasing per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A limit or marketable order.
///
/// `price == 0.0` marks a marketable order, crossed at whatever price the next
/// opposing trade prints. Amounts are always positive; direction lives in
/// [`side`](Order::side).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    /// Limit price, or `0.0` for a marketable order.
    pub price: f64,
    /// Amount still to be filled.
    pub amount: f64,
    /// Amount at creation. Never changes.
    pub original_amount: f64,
    /// Cumulative `fill price × fill amount`.
    pub executed_value: f64,
}

impl Order {
    /// Create a limit order.
    pub fn new(id: OrderId, side: Side, price: f64, amount: f64) -> Self {
        Self { id, side, price, amount, original_amount: amount, executed_value: 0.0 }
    }

    /// Create a marketable (price 0) order.
    pub fn market(id: OrderId, side: Side, amount: f64) -> Self {
        Self::new(id, side, 0.0, amount)
    }

    #[inline]
    pub fn is_marketable(&self) -> bool {
        self.price == 0.0
    }

    /// `true` once the remaining amount is negligible relative to the original.
    ///
    /// This is the single fill-completion test; every "remove from book" and
    /// "notify strategy" decision goes through it.
    #[inline]
    pub fn is_filled(&self) -> bool {
        if self.original_amount == 0.0 {
            return is_zero(self.amount);
        }
        is_zero(self.amount / self.original_amount)
    }

    /// Limit price × original amount.
    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.original_amount
    }

    /// Amount filled so far.
    #[inline]
    pub fn filled_amount(&self) -> f64 {
        self.original_amount - self.amount
    }

    /// Average execution price, or `None` before the first fill.
    pub fn average_price(&self) -> Option<f64> {
        let filled = self.filled_amount();
        if is_zero(filled) { None } else { Some(self.executed_value / filled) }
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order(id={} {} {:.8}@{:.8} orig={:.8})",
            self.id, self.side, self.amount, self.price, self.original_amount
        )
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Result of applying one fill to a [`Position`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionUpdate {
    /// Flat → non-zero.
    Opened,
    /// Non-zero → non-zero, same sign.
    Adjusted,
    /// Non-zero → flat. `gain` is the realized profit (negative for a loss).
    Closed { gain: f64 },
}

/// A single signed margin position with a fee-inclusive cash basis.
///
/// `amount` is positive for long and negative for short. `cost` is the signed
/// cash attributed to the position: buys add `amount × price × (1 + fee)`,
/// sells add `-amount × price × (1 - fee)`. Once the amount returns to zero
/// the remaining `-cost` is the realized gain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub side: PositionSide,
    pub cost: f64,
    pub amount: f64,
}

impl Position {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        is_zero(self.amount)
    }

    /// Apply a fill of `amount` (positive) on `side` at `price`, charging `fee`.
    ///
    /// A fill that would carry the position through zero to the other sign is
    /// rejected with [`SimError::PositionFlip`]; the position is left untouched.
    pub fn apply_fill(
        &mut self,
        time: i64,
        side: Side,
        amount: f64,
        price: f64,
        fee: f64,
    ) -> Result<PositionUpdate, SimError> {
        let fee_ratio = match side {
            Side::Buy => 1.0 + fee,
            Side::Sell => 1.0 - fee,
            Side::Unknown => {
                return Err(SimError::Invariant(format!("position fill without a side at #{time}")));
            }
        };

        let signed = side.sign() * amount;
        let new_amount = self.amount + signed;

        if !is_zero(new_amount) && !is_zero(self.amount) && new_amount * self.amount < 0.0 {
            return Err(SimError::PositionFlip { time, before: self.amount, after: new_amount });
        }

        let new_cost = self.cost + signed * price * fee_ratio;

        if !is_zero(self.amount) && is_zero(new_amount) {
            self.amount = 0.0;
            self.cost = new_cost;
            return Ok(PositionUpdate::Closed { gain: -new_cost });
        }

        let opened = is_zero(self.amount) && !is_zero(new_amount);
        if opened {
            self.side = if new_amount > 0.0 { PositionSide::Long } else { PositionSide::Short };
        }
        self.amount = new_amount;
        self.cost = new_cost;

        Ok(if opened { PositionUpdate::Opened } else { PositionUpdate::Adjusted })
    }

    /// Realized gain of a closed position.
    #[inline]
    pub fn gain(&self) -> f64 {
        -self.cost
    }

    /// Fee-inclusive break-even price. `None` while flat.
    pub fn base_price(&self) -> Option<f64> {
        if self.is_flat() { None } else { Some(self.cost / self.amount) }
    }

    /// Relative move of `price` against the base price, positive when the
    /// position is in profit. `0.0` while flat.
    pub fn value_ratio(&self, price: f64) -> f64 {
        let Some(base) = self.base_price() else {
            return 0.0;
        };
        let ratio = (price - base) / base;
        match self.side {
            PositionSide::Long => ratio,
            PositionSide::Short => -ratio,
            PositionSide::Unknown => 0.0,
        }
    }

    /// Mark-to-market profit of the open position at `price`.
    pub fn unrealized_value(&self, price: f64) -> f64 {
        if self.side == PositionSide::Unknown {
            return 0.0;
        }
        match self.base_price() {
            Some(base) => (price - base) * self.amount,
            None => 0.0,
        }
    }
}
