//! # bt-sim
//!
//! Discrete-event simulation core: a synthetic exchange and a trading
//! strategy exchanging delayed events while a trade tape is replayed.
//!
//! Exchanges implement [`MatchingEngine`] and strategies implement
//! [`Strategy`]. The [`driver::Simulation`] owns one of each plus the
//! [`event::EventQueue`] and lends them out by reference, so a run is a plain
//! value with no global state.
//!
//! ## Variants
//!
//! | Strategy                         | Exchange                           | Orders           |
//! |----------------------------------|------------------------------------|------------------|
//! | [`GridBot`](strategy::GridBot)   | [`SpotExchange`](exchange::SpotExchange)     | limit + chase    |
//! | [`MomentumBot`](strategy::MomentumBot) | [`MarginExchange`](exchange::MarginExchange) | market only |

pub mod book;
pub mod driver;
pub mod event;
pub mod exchange;
pub mod strategy;

use bt_core::error::SimError;
use bt_core::{Order, Trade};

use crate::book::OrderBook;
use crate::event::EventQueue;

/// Account state as seen by the driver at a given mark price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountSnapshot {
    /// Cash balance, excluding any reservation.
    pub cash: f64,
    /// Coin held (spot, free + locked) or signed position amount (margin).
    pub holdings: f64,
    /// Total account value at the mark price.
    pub value: f64,
}

impl std::fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cash={:.6} holdings={:.8} value={:.6}", self.cash, self.holdings, self.value)
    }
}

/// Trait implemented by the simulated exchanges.
///
/// # Lifecycle
///
/// 1. The driver delivers `CreateOrder` / `CancelOrder` events through
///    [`create_order`](MatchingEngine::create_order) and
///    [`cancel_order`](MatchingEngine::cancel_order).
/// 2. Every tape trade goes through [`process_trade`](MatchingEngine::process_trade),
///    which fills resting orders and schedules `Executed` events.
/// 3. [`snapshot`](MatchingEngine::snapshot) is polled after each trade.
pub trait MatchingEngine {
    /// Human-readable exchange name.
    fn name(&self) -> &str;

    /// Accept or softly reject a new order. Rejections are not errors.
    fn create_order(&mut self, now: i64, order: Order, queue: &mut EventQueue) -> Result<(), SimError>;

    /// Cancel a resting order. Unknown ids are ignored.
    fn cancel_order(&mut self, now: i64, order: &Order) -> Result<(), SimError>;

    /// Match resting orders against `trade`, consuming its amount.
    fn process_trade(&mut self, trade: &mut Trade, queue: &mut EventQueue) -> Result<(), SimError>;

    /// Account state marked at `price`.
    fn snapshot(&self, price: f64) -> AccountSnapshot;

    /// Cumulative traded quote volume.
    fn volume(&self) -> f64;

    fn buy_book(&self) -> &OrderBook;

    fn sell_book(&self) -> &OrderBook;
}

/// Trait implemented by the trading strategies.
///
/// Each strategy is paired with one exchange type and may read its public
/// state, but only ever mutates it through events.
pub trait Strategy {
    type Exchange: MatchingEngine;

    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// Place the initial orders. Called once, on the first trade.
    fn init(
        &mut self,
        now: i64,
        price: f64,
        exchange: &Self::Exchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError>;

    /// React to a fully filled order.
    fn on_executed(
        &mut self,
        now: i64,
        order: Order,
        exchange: &Self::Exchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError>;

    /// React to a periodic price observation.
    fn on_check_price(
        &mut self,
        _now: i64,
        _price: f64,
        _exchange: &Self::Exchange,
        _queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        Ok(())
    }

    /// Seconds between price checks, or `None` if the strategy does not
    /// want them.
    fn price_check_interval(&self) -> Option<i64> {
        None
    }
}
