//! One side's resting orders, kept sorted by price.
//!
//! Orders are sorted **ascending** by price with marketable (price 0) orders
//! at the very end, so:
//!
//! - [`front`](OrderBook::front) is the cheapest limit order (best ask when
//!   used for sells),
//! - [`back`](OrderBook::back) is the oldest marketable order if one exists,
//!   otherwise the most expensive limit order (best bid when used for buys).
//!
//! Books hold a handful of orders per run, so a `Vec` with linear insertion
//! is all that is needed.

use bt_core::approx::is_near;
use bt_core::{Order, OrderId};

/// Price-sorted list of resting orders.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: Vec<Order>,
}

impl OrderBook {
    /// Create a new empty book.
    pub fn new() -> Self {
        Self { orders: Vec::new() }
    }

    /// Insert `order` before the first resting order priced above it.
    ///
    /// A price of `0.0` sorts after every limit price. Limit orders at an
    /// equal price keep insertion order; a new marketable order is placed in
    /// front of the existing marketable ones, leaving the oldest at the back.
    pub fn insert(&mut self, order: Order) {
        let pos = self
            .orders
            .iter()
            .position(|o| o.is_marketable() || (!order.is_marketable() && o.price > order.price))
            .unwrap_or(self.orders.len());
        self.orders.insert(pos, order);
    }

    /// Remove and return the order with `id`.
    pub fn remove(&mut self, id: OrderId) -> Option<Order> {
        let idx = self.orders.iter().position(|o| o.id == id)?;
        Some(self.orders.remove(idx))
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.iter().any(|o| o.id == id)
    }

    /// First order whose original amount is within tolerance of `amount`.
    pub fn find_equivalent(&self, amount: f64) -> Option<&Order> {
        self.orders.iter().find(|o| is_near(o.original_amount, amount))
    }

    pub fn front(&self) -> Option<&Order> {
        self.orders.first()
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.first_mut()
    }

    pub fn back(&self) -> Option<&Order> {
        self.orders.last()
    }

    pub fn back_mut(&mut self) -> Option<&mut Order> {
        self.orders.last_mut()
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        if self.orders.is_empty() { None } else { Some(self.orders.remove(0)) }
    }

    pub fn pop_back(&mut self) -> Option<Order> {
        self.orders.pop()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Returns `true` if no order is resting.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }
}

impl std::fmt::Display for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.orders.len())?;
        for o in &self.orders {
            write!(f, " {:.6}@{:.6}", o.amount, o.price)?;
        }
        Ok(())
    }
}
