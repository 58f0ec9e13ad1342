//! Momentum strategy: hold one margin position and ride it.
//!
//! The bot opens a long position, then reacts to periodic price checks:
//!
//! - **ratio flow**: close below the stop-loss ratio; above the take-profit
//!   ratio arm a trailing stop that ratchets up with the ratio and close once
//!   the ratio falls back under it.
//! - **life-time flow**: close a position that has not made a new high for
//!   the configured duration.
//!
//! After every close the next side is chosen from the outcome (keep the side
//! on a win, flip it on a loss) and reopened after a backoff that doubles per
//! consecutive loss.

use bt_core::config::MomentumConfig;
use bt_core::error::SimError;
use bt_core::{Order, OrderId, PositionSide, Side};
use tracing::{debug, info};

use crate::book::OrderBook;
use crate::event::{Event, EventQueue};
use crate::exchange::MarginExchange;
use crate::Strategy;

/// Momentum bot trading on a [`MarginExchange`].
#[derive(Debug, Clone)]
pub struct MomentumBot {
    amount: f64,
    take_profit_ratio: f64,
    trailing_stop_diff: f64,
    stop_loss_ratio: f64,
    init_backoff: i64,
    max_backoff: i64,
    use_ratio_flow: bool,
    life_time: Option<i64>,
    check_interval: i64,

    next_side: PositionSide,
    orders: OrderBook,
    backoff: i64,
    next_id: u64,
    /// Armed trailing take-profit ratio.
    trailing: Option<f64>,
    highest_ratio: f64,
    highest_ratio_time: i64,
}

impl MomentumBot {
    pub fn new(config: &MomentumConfig) -> Self {
        Self {
            amount: config.amount,
            take_profit_ratio: config.take_profit_ratio,
            trailing_stop_diff: config.trailing_stop_diff,
            stop_loss_ratio: config.stop_loss_ratio,
            init_backoff: config.init_backoff,
            max_backoff: config.max_backoff,
            use_ratio_flow: config.use_ratio_flow,
            life_time: config.life_time(),
            check_interval: config.check_price_interval,
            next_side: PositionSide::Long,
            orders: OrderBook::new(),
            backoff: config.init_backoff,
            next_id: 0,
            trailing: None,
            highest_ratio: -1.0,
            highest_ratio_time: 0,
        }
    }

    /// Current re-entry delay.
    pub fn backoff(&self) -> i64 {
        self.backoff
    }

    /// Side of the next position to open.
    pub fn next_side(&self) -> PositionSide {
        self.next_side
    }

    /// Armed trailing take-profit ratio, if any.
    pub fn trailing_ratio(&self) -> Option<f64> {
        self.trailing
    }

    /// Orders sent and not yet reported executed.
    pub fn pending_orders(&self) -> &OrderBook {
        &self.orders
    }

    /// Send one marketable order, deliverable at `at` plus the queue delay.
    fn submit(&mut self, at: i64, side: Side, queue: &mut EventQueue) {
        let order = Order::market(OrderId(self.next_id), side, self.amount);
        self.next_id += 1;
        debug!("[momentum] #{at} id={} create {side} {:.8}", order.id, order.amount);
        self.orders.insert(order);
        queue.enqueue(Event::CreateOrder(order), at + queue.delay());
    }

    /// Open a position on `side`, effective at `at`.
    fn open_position(&mut self, at: i64, side: PositionSide, queue: &mut EventQueue) {
        self.trailing = None;
        self.highest_ratio = -1.0;
        self.highest_ratio_time = at;

        if let Some(pending) = self.orders.front() {
            debug!("[momentum] #{at} not opening: order {} not executed yet", pending.id);
            return;
        }
        self.submit(at, side.opening_side(), queue);
    }

    fn close_position(&mut self, now: i64, exchange: &MarginExchange, queue: &mut EventQueue) -> Result<(), SimError> {
        self.trailing = None;

        if let Some(pending) = self.orders.front() {
            debug!("[momentum] #{now} not closing: order {} not executed yet", pending.id);
            return Ok(());
        }
        let side = exchange.position().side;
        if side == PositionSide::Unknown {
            return Err(SimError::Invariant(format!("close requested at #{now} without a position")));
        }
        self.submit(now, side.closing_side(), queue);
        Ok(())
    }

    fn check_ratio_flow(
        &mut self,
        now: i64,
        ratio: f64,
        exchange: &MarginExchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        let side = exchange.position().side;
        if ratio < self.stop_loss_ratio {
            info!("[momentum] #{now} ratio {ratio:.6}: close {side} to stop loss");
            return self.close_position(now, exchange, queue);
        }

        match self.trailing {
            Some(stop) if ratio < stop => {
                info!("[momentum] #{now} ratio {ratio:.6}: close {side} to take profit");
                self.close_position(now, exchange, queue)
            }
            Some(stop) => {
                let raised = ratio - self.trailing_stop_diff;
                if raised > stop {
                    debug!("[momentum] #{now} ratio {ratio:.6}: trailing stop raised to {raised:.6}");
                    self.trailing = Some(raised);
                }
                Ok(())
            }
            None if ratio > self.take_profit_ratio => {
                let stop = ratio - self.trailing_stop_diff;
                debug!("[momentum] #{now} ratio {ratio:.6}: trailing stop armed at {stop:.6}");
                self.trailing = Some(stop);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check_life_time_flow(
        &mut self,
        now: i64,
        ratio: f64,
        life_time: i64,
        exchange: &MarginExchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        if ratio > self.highest_ratio {
            debug!("[momentum] #{now} ratio {ratio:.6}: new high");
            self.highest_ratio = ratio;
            self.highest_ratio_time = now;
            return Ok(());
        }
        if now - self.highest_ratio_time >= life_time {
            let outcome = if ratio > 0.0 { "WIN" } else { "LOSS" };
            info!(
                "[momentum] #{now} ratio {ratio:.6}: no new high for {life_time}s, close {} ({outcome})",
                exchange.position().side
            );
            return self.close_position(now, exchange, queue);
        }
        Ok(())
    }
}

impl Strategy for MomentumBot {
    type Exchange = MarginExchange;

    fn name(&self) -> &str {
        "momentum"
    }

    fn init(&mut self, now: i64, _price: f64, _exchange: &MarginExchange, queue: &mut EventQueue) -> Result<(), SimError> {
        self.open_position(now, self.next_side, queue);
        Ok(())
    }

    fn on_executed(
        &mut self,
        now: i64,
        order: Order,
        exchange: &MarginExchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        debug!(
            "[momentum] #{now} executed {} {:.8} @ {:.8} ({:.6} quote)",
            order.side,
            order.original_amount,
            order.average_price().unwrap_or(0.0),
            order.executed_value
        );

        let expected = self.orders.front().map(|o| o.id);
        if expected != Some(order.id) {
            return Err(SimError::ExecutedMismatch { expected, got: order.id });
        }
        self.orders.pop_front();

        if !exchange.position().is_flat() {
            return Ok(());
        }

        let closed = exchange
            .last_closed()
            .ok_or_else(|| SimError::Invariant(format!("flat at #{now} without a closed position")))?;
        if closed.side == PositionSide::Unknown {
            return Err(SimError::Invariant(format!("closed position at #{now} has no side")));
        }

        let win = closed.gain() > 0.0;
        if win {
            self.next_side = closed.side;
            self.backoff = self.init_backoff;
        } else {
            self.next_side = closed.side.flipped();
            self.backoff = (self.backoff * 2).min(self.max_backoff);
        }
        info!(
            "[momentum] #{now} closed a {} {} position; next {} after {}s",
            if win { "WIN" } else { "LOSS" },
            closed.side,
            self.next_side,
            self.backoff
        );
        self.open_position(now + self.backoff, self.next_side, queue);
        Ok(())
    }

    fn on_check_price(
        &mut self,
        now: i64,
        price: f64,
        exchange: &MarginExchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        let position = exchange.position();
        if position.side == PositionSide::Unknown {
            return Ok(());
        }
        let ratio = position.value_ratio(price);
        debug!("[momentum] #{now} ratio {ratio:.6} at price {price:.8}");

        if self.use_ratio_flow {
            self.check_ratio_flow(now, ratio, exchange, queue)?;
        }
        if let Some(life_time) = self.life_time {
            self.check_life_time_flow(now, ratio, life_time, exchange, queue)?;
        }
        Ok(())
    }

    fn price_check_interval(&self) -> Option<i64> {
        Some(self.check_interval)
    }
}
