//! Margin exchange holding a single signed position.
//!
//! Orders are always accepted and always filled at the trade price with the
//! taker fee, oldest order first on either side. Unlike the spot exchange a
//! trade is drained completely: every order it completes gets its own
//! `Executed` event.
//!
//! When a fill brings the position back to zero, the realized gain is
//! credited to cash, the closed position is kept for the strategy to inspect
//! and a fresh empty position takes its place.

use bt_core::error::SimError;
use bt_core::{Order, Position, PositionUpdate, Side, Trade};
use tracing::{debug, info};

use crate::book::OrderBook;
use crate::event::{Event, EventQueue};
use crate::{AccountSnapshot, MatchingEngine};

/// Margin matching engine for the momentum strategy.
#[derive(Debug, Clone)]
pub struct MarginExchange {
    buy_orders: OrderBook,
    sell_orders: OrderBook,
    position: Position,
    last_closed: Option<Position>,
    cash: f64,
    volume: f64,
    taker_fee: f64,
}

impl MarginExchange {
    pub fn new(budget: f64, taker_fee: f64) -> Self {
        Self {
            buy_orders: OrderBook::new(),
            sell_orders: OrderBook::new(),
            position: Position::new(),
            last_closed: None,
            cash: budget,
            volume: 0.0,
            taker_fee,
        }
    }

    /// The open position; flat with side `Unknown` when none is open.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// The most recently closed position.
    pub fn last_closed(&self) -> Option<&Position> {
        self.last_closed.as_ref()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    fn book_mut(&mut self, side: Side) -> &mut OrderBook {
        match side {
            Side::Buy => &mut self.buy_orders,
            _ => &mut self.sell_orders,
        }
    }

    /// Apply one fill to the position, settling it if it closes.
    fn settle(&mut self, now: i64, side: Side, qty: f64, price: f64) -> Result<(), SimError> {
        match self.position.apply_fill(now, side, qty, price, self.taker_fee)? {
            PositionUpdate::Opened => {
                debug!(
                    "[margin] #{now} {} position opened at base {:.8}",
                    self.position.side,
                    self.position.base_price().unwrap_or(price)
                );
            }
            PositionUpdate::Adjusted => {}
            PositionUpdate::Closed { gain } => {
                info!("[margin] #{now} {} position closed with gain {gain:.6}", self.position.side);
                self.cash += gain;
                self.last_closed = Some(self.position);
                self.position = Position::new();
            }
        }
        Ok(())
    }

    /// Drain `trade` against the resting orders on `side`.
    fn match_side(&mut self, side: Side, trade: &mut Trade, queue: &mut EventQueue) -> Result<(), SimError> {
        let now = trade.time;
        while trade.amount > 0.0 {
            // Only marketable orders rest here; the oldest sits at the back.
            let Some(resting) = self.book_mut(side).back_mut() else {
                break;
            };
            let qty = resting.amount.min(trade.amount);
            debug!(
                "[margin] #{now} id={} {side} @{:.8} ({:.8} -> {:.8})",
                resting.id,
                trade.price,
                resting.amount,
                resting.amount - qty
            );
            resting.amount -= qty;
            resting.executed_value += trade.price * qty;
            let order = *resting;

            trade.amount -= qty;
            self.volume += trade.price * qty;
            self.settle(now, side, qty, trade.price)?;

            if order.is_filled() {
                self.book_mut(side).remove(order.id);
                debug!("[margin] #{now} id={} {side} done, to notify", order.id);
                queue.schedule(now, Event::Executed(order));
            }
        }
        Ok(())
    }
}

impl MatchingEngine for MarginExchange {
    fn name(&self) -> &str {
        "margin"
    }

    fn create_order(&mut self, now: i64, order: Order, _queue: &mut EventQueue) -> Result<(), SimError> {
        if order.side == Side::Unknown {
            return Err(SimError::Invariant(format!("order {} has no side", order.id)));
        }
        debug!("[margin] #{now} created {} id={} {:.8}", order.side, order.id, order.original_amount);
        self.book_mut(order.side).insert(order);
        Ok(())
    }

    fn cancel_order(&mut self, _now: i64, order: &Order) -> Result<(), SimError> {
        Err(SimError::UnsupportedCancel { side: order.side, id: order.id })
    }

    fn process_trade(&mut self, trade: &mut Trade, queue: &mut EventQueue) -> Result<(), SimError> {
        match trade.side {
            Side::Buy => self.match_side(Side::Sell, trade, queue),
            Side::Sell => self.match_side(Side::Buy, trade, queue),
            Side::Unknown => Ok(()),
        }
    }

    fn snapshot(&self, price: f64) -> AccountSnapshot {
        AccountSnapshot {
            cash: self.cash,
            holdings: self.position.amount,
            value: self.cash + self.position.unrealized_value(price),
        }
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn buy_book(&self) -> &OrderBook {
        &self.buy_orders
    }

    fn sell_book(&self) -> &OrderBook {
        &self.sell_orders
    }
}

#[cfg(test)]
mod tests {
    use bt_core::approx::is_near;
    use bt_core::{OrderId, PositionSide};

    use super::*;

    fn trade(time: i64, price: f64, amount: f64, side: Side) -> Trade {
        Trade::new(time, 1, price, amount, side)
    }

    fn executed(q: &mut EventQueue, now: i64) -> Vec<OrderId> {
        std::iter::from_fn(|| q.pop_due(now))
            .filter_map(|e| match e {
                Event::Executed(o) => Some(o.id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn round_trip_realizes_fee_inclusive_gain() {
        let mut ex = MarginExchange::new(10_000.0, 0.002);
        let mut q = EventQueue::new(10);

        ex.create_order(0, Order::market(OrderId(0), Side::Buy, 1.0), &mut q).unwrap();
        ex.process_trade(&mut trade(1, 100.0, 5.0, Side::Sell), &mut q).unwrap();
        assert_eq!(ex.position().side, PositionSide::Long);
        assert!(is_near(ex.position().cost, 100.2));
        assert!(is_near(ex.snapshot(100.0).value, 10_000.0 - 0.2));
        assert_eq!(executed(&mut q, 11), vec![OrderId(0)]);

        ex.create_order(20, Order::market(OrderId(1), Side::Sell, 1.0), &mut q).unwrap();
        ex.process_trade(&mut trade(21, 110.0, 5.0, Side::Buy), &mut q).unwrap();

        let closed = ex.last_closed().copied().unwrap();
        assert_eq!(closed.side, PositionSide::Long);
        assert!(is_near(closed.gain(), 110.0 * 0.998 - 100.2));
        assert!(is_near(ex.cash(), 10_000.0 + closed.gain()));
        assert_eq!(*ex.position(), Position::new());
        assert!(is_near(ex.volume(), 210.0));
        assert_eq!(executed(&mut q, 31), vec![OrderId(1)]);
    }

    #[test]
    fn trade_is_drained_across_orders() {
        let mut ex = MarginExchange::new(1_000.0, 0.0);
        let mut q = EventQueue::new(0);
        ex.create_order(0, Order::market(OrderId(0), Side::Buy, 1.0), &mut q).unwrap();
        ex.create_order(0, Order::market(OrderId(1), Side::Buy, 1.0), &mut q).unwrap();

        let mut t = trade(1, 50.0, 3.0, Side::Sell);
        ex.process_trade(&mut t, &mut q).unwrap();

        assert!(is_near(t.amount, 1.0));
        assert!(ex.buy_book().is_empty());
        assert!(is_near(ex.position().amount, 2.0));
        assert_eq!(executed(&mut q, 1).len(), 2);
    }

    #[test]
    fn sells_fill_oldest_first() {
        let mut ex = MarginExchange::new(1_000.0, 0.0);
        let mut q = EventQueue::new(0);
        ex.create_order(0, Order::market(OrderId(0), Side::Sell, 1.0), &mut q).unwrap();
        ex.create_order(0, Order::market(OrderId(1), Side::Sell, 2.0), &mut q).unwrap();

        ex.process_trade(&mut trade(1, 50.0, 1.0, Side::Buy), &mut q).unwrap();

        assert_eq!(executed(&mut q, 1), vec![OrderId(0)]);
        assert!(is_near(ex.position().amount, -1.0));
        let resting = ex.sell_book().back().copied().unwrap();
        assert_eq!(resting.id, OrderId(1));
        assert!(is_near(resting.amount, 2.0));
    }

    #[test]
    fn partial_fill_keeps_order_resting() {
        let mut ex = MarginExchange::new(1_000.0, 0.002);
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::market(OrderId(0), Side::Sell, 2.0), &mut q).unwrap();

        ex.process_trade(&mut trade(1, 50.0, 0.5, Side::Buy), &mut q).unwrap();
        assert_eq!(ex.position().side, PositionSide::Short);
        assert!(is_near(ex.position().amount, -0.5));
        let resting = ex.sell_book().front().copied().unwrap();
        assert!(is_near(resting.amount, 1.5));
        assert!(is_near(resting.executed_value, 25.0));
        assert!(q.is_empty());
    }

    #[test]
    fn sign_flip_is_fatal() {
        let mut ex = MarginExchange::new(1_000.0, 0.002);
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::market(OrderId(0), Side::Buy, 1.0), &mut q).unwrap();
        ex.process_trade(&mut trade(1, 50.0, 1.0, Side::Sell), &mut q).unwrap();

        ex.create_order(2, Order::market(OrderId(1), Side::Sell, 2.0), &mut q).unwrap();
        let err = ex.process_trade(&mut trade(3, 50.0, 2.0, Side::Buy), &mut q).unwrap_err();
        assert!(matches!(err, SimError::PositionFlip { .. }));
    }

    #[test]
    fn cancel_is_unsupported() {
        let mut ex = MarginExchange::new(1_000.0, 0.002);
        let order = Order::market(OrderId(4), Side::Buy, 1.0);
        assert!(matches!(ex.cancel_order(0, &order), Err(SimError::UnsupportedCancel { .. })));
    }
}
