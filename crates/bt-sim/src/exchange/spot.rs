//! Spot exchange with cash/coin balances and limit orders.
//!
//! Buys reserve `price × amount` of cash at creation; sells move coin from
//! free to locked. Resting orders fill against tape trades that cross them:
//!
//! - a BUY trade fills the cheapest SELL priced strictly below it,
//! - a SELL trade fills the priciest BUY priced strictly above it, or any
//!   marketable BUY at the trade price.
//!
//! At most one order completes per trade; any leftover trade amount is
//! dropped and the next completion waits for the next trade.

use bt_core::error::SimError;
use bt_core::{Order, Side, Trade};
use tracing::debug;

use crate::book::OrderBook;
use crate::event::{Event, EventQueue};
use crate::{AccountSnapshot, MatchingEngine};

/// Spot matching engine for the grid strategy.
#[derive(Debug, Clone)]
pub struct SpotExchange {
    buy_orders: OrderBook,
    sell_orders: OrderBook,
    coin: f64,
    coin_locked: f64,
    cash: f64,
    cash_locked: f64,
    volume: f64,
    maker_fee: f64,
    taker_fee: f64,
    cash_floor: f64,
}

impl SpotExchange {
    /// Create an exchange holding `budget` cash and no coin.
    pub fn new(budget: f64, maker_fee: f64, taker_fee: f64, cash_floor: f64) -> Self {
        Self {
            buy_orders: OrderBook::new(),
            sell_orders: OrderBook::new(),
            coin: 0.0,
            coin_locked: 0.0,
            cash: budget,
            cash_locked: 0.0,
            volume: 0.0,
            maker_fee,
            taker_fee,
            cash_floor,
        }
    }

    /// Free coin.
    pub fn coin(&self) -> f64 {
        self.coin
    }

    /// Coin locked by resting sells.
    pub fn coin_locked(&self) -> f64 {
        self.coin_locked
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Cash reserved by resting buys.
    pub fn cash_locked(&self) -> f64 {
        self.cash_locked
    }

    fn create_buy(&mut self, now: i64, order: Order) {
        let reserve = order.price * order.amount;
        // Reservations are not subtracted: stale buys get canceled anyway.
        if self.cash - reserve < self.cash_floor {
            debug!("[spot] #{now} cash not enough to buy {:.8}@{:.8}", order.amount, order.price);
            return;
        }
        debug!("[spot] #{now} created BUY id={} {:.8}@{:.8}", order.id, order.amount, order.price);
        self.cash_locked += reserve;
        self.buy_orders.insert(order);
    }

    fn create_sell(&mut self, now: i64, order: Order, queue: &mut EventQueue) {
        if order.amount > self.coin {
            debug!(
                "[spot] #{now} coin not enough to sell {:.8}@{:.8}, will retry",
                order.amount, order.price
            );
            queue.schedule(now, Event::CreateOrder(order));
            return;
        }
        debug!("[spot] #{now} created SELL id={} {:.8}@{:.8}", order.id, order.amount, order.price);
        self.coin -= order.amount;
        self.coin_locked += order.amount;
        self.sell_orders.insert(order);
    }

    /// Fill resting sells from a BUY trade. Returns the completed order, if any.
    fn match_sells(&mut self, trade: &mut Trade) -> Option<Order> {
        let now = trade.time;
        while trade.amount > 0.0 {
            let resting = self.sell_orders.front_mut()?;
            if resting.price >= trade.price {
                return None;
            }
            let qty = resting.amount.min(trade.amount);
            debug!(
                "[spot] #{now} sell @{:.8} ({:.8} -> {:.8})",
                resting.price,
                resting.amount,
                resting.amount - qty
            );
            resting.amount -= qty;
            resting.executed_value += resting.price * qty;
            let order = *resting;

            trade.amount -= qty;
            self.coin_locked -= qty;
            self.cash += order.price * qty * (1.0 - self.maker_fee);
            self.volume += order.price * qty;

            if order.is_filled() {
                self.sell_orders.pop_front();
                return Some(order);
            }
        }
        None
    }

    /// Fill resting buys from a SELL trade. Returns the completed order, if any.
    fn match_buys(&mut self, trade: &mut Trade) -> Option<Order> {
        let now = trade.time;
        while trade.amount > 0.0 {
            let resting = self.buy_orders.back_mut()?;
            if !resting.is_marketable() && resting.price <= trade.price {
                return None;
            }
            let (price, fee) = if resting.is_marketable() {
                (trade.price, self.taker_fee)
            } else {
                (resting.price, self.maker_fee)
            };
            let qty = resting.amount.min(trade.amount);
            debug!("[spot] #{now} buy @{price:.8} ({:.8} -> {:.8})", resting.amount, resting.amount - qty);
            resting.amount -= qty;
            resting.executed_value += price * qty;
            let order = *resting;

            trade.amount -= qty;
            self.coin += qty * (1.0 - fee);
            self.cash -= qty * price;
            self.cash_locked -= order.price * qty;
            self.volume += price * qty;

            if order.is_filled() {
                self.buy_orders.pop_back();
                return Some(order);
            }
        }
        None
    }
}

impl MatchingEngine for SpotExchange {
    fn name(&self) -> &str {
        "spot"
    }

    fn create_order(&mut self, now: i64, order: Order, queue: &mut EventQueue) -> Result<(), SimError> {
        match order.side {
            Side::Buy => self.create_buy(now, order),
            Side::Sell => self.create_sell(now, order, queue),
            Side::Unknown => {
                return Err(SimError::Invariant(format!("order {} has no side", order.id)));
            }
        }
        Ok(())
    }

    fn cancel_order(&mut self, now: i64, order: &Order) -> Result<(), SimError> {
        if order.side != Side::Buy {
            return Err(SimError::UnsupportedCancel { side: order.side, id: order.id });
        }
        if let Some(resting) = self.buy_orders.remove(order.id) {
            self.cash_locked -= resting.amount * resting.price;
            debug!("[spot] #{now} canceled BUY id={} {:.8}@{:.8}", resting.id, resting.amount, resting.price);
        }
        Ok(())
    }

    fn process_trade(&mut self, trade: &mut Trade, queue: &mut EventQueue) -> Result<(), SimError> {
        let done = match trade.side {
            Side::Buy => self.match_sells(trade),
            Side::Sell => self.match_buys(trade),
            // Untagged trades cross nothing.
            Side::Unknown => None,
        };
        if let Some(order) = done {
            debug!("[spot] #{} {} id={} done, to notify", trade.time, order.side, order.id);
            queue.schedule(trade.time, Event::Executed(order));
        }
        Ok(())
    }

    fn snapshot(&self, price: f64) -> AccountSnapshot {
        let holdings = self.coin + self.coin_locked;
        AccountSnapshot { cash: self.cash, holdings, value: self.cash + holdings * price }
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
    use bt_core::OrderId;
    use bt_core::approx::is_near;

    use super::*;
    use crate::event::EventKind;

    fn exchange() -> SpotExchange {
        SpotExchange::new(1_000.0, 0.001, 0.002, 0.0)
    }

    fn trade(time: i64, price: f64, amount: f64, side: Side) -> Trade {
        Trade::new(time, 1, price, amount, side)
    }

    #[test]
    fn create_then_cancel_restores_reservation() {
        let mut ex = exchange();
        let mut q = EventQueue::new(10);
        let buy = Order::new(OrderId(1), Side::Buy, 97.5, 2.051_282);

        ex.create_order(0, buy, &mut q).unwrap();
        assert!(is_near(ex.cash_locked(), 97.5 * 2.051_282));
        assert_eq!(ex.cash(), 1_000.0);

        ex.cancel_order(5, &buy).unwrap();
        assert!(is_near(ex.cash_locked(), 0.0));
        assert!(ex.buy_book().is_empty());

        // Already gone: no-op.
        ex.cancel_order(6, &buy).unwrap();
        assert!(is_near(ex.cash_locked(), 0.0));
    }

    #[test]
    fn buy_below_cash_floor_is_dropped() {
        let mut ex = SpotExchange::new(1_000.0, 0.001, 0.002, 900.0);
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::new(OrderId(1), Side::Buy, 100.0, 2.0), &mut q).unwrap();
        assert!(ex.buy_book().is_empty());
        assert_eq!(ex.cash_locked(), 0.0);
        assert!(q.is_empty());
    }

    #[test]
    fn sell_without_coin_is_retried() {
        let mut ex = exchange();
        let mut q = EventQueue::new(10);
        let sell = Order::new(OrderId(1), Side::Sell, 105.0, 1.0);

        ex.create_order(100, sell, &mut q).unwrap();
        assert!(ex.sell_book().is_empty());
        assert_eq!(ex.cash(), 1_000.0);
        assert_eq!(q.peek_due(), Some(110));
        assert_eq!(q.pop_due(110), Some(Event::CreateOrder(sell)));
    }

    #[test]
    fn sell_locks_coin_and_fills_on_crossing_buy() {
        let mut ex = exchange();
        ex.coin = 2.0;
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::new(OrderId(1), Side::Sell, 105.0, 1.5), &mut q).unwrap();
        assert_eq!(ex.coin(), 0.5);
        assert_eq!(ex.coin_locked(), 1.5);
        assert_eq!(ex.cash(), 1_000.0);

        // Not strictly above the resting price: no fill.
        let mut t = trade(1, 105.0, 10.0, Side::Buy);
        ex.process_trade(&mut t, &mut q).unwrap();
        assert_eq!(ex.coin_locked(), 1.5);

        let mut t = trade(2, 106.0, 1.0, Side::Buy);
        ex.process_trade(&mut t, &mut q).unwrap();
        assert!(is_near(ex.coin_locked(), 0.5));
        assert!(is_near(ex.cash(), 1_000.0 + 105.0 * 0.999));
        assert!(is_near(ex.volume(), 105.0));
        assert!(q.is_empty());
        assert!(is_near(ex.coin() + ex.coin_locked(), 1.0));

        let mut t = trade(3, 106.0, 1.0, Side::Buy);
        ex.process_trade(&mut t, &mut q).unwrap();
        assert!(ex.sell_book().is_empty());
        assert!(is_near(t.amount, 0.5));
        match q.pop_due(13) {
            Some(Event::Executed(o)) => {
                assert_eq!(o.id, OrderId(1));
                assert_eq!(o.original_amount, 1.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_one_completion_per_trade() {
        let mut ex = exchange();
        ex.coin = 2.0;
        let mut q = EventQueue::new(0);
        ex.create_order(0, Order::new(OrderId(1), Side::Sell, 101.0, 1.0), &mut q).unwrap();
        ex.create_order(0, Order::new(OrderId(2), Side::Sell, 102.0, 1.0), &mut q).unwrap();

        let mut t = trade(1, 110.0, 5.0, Side::Buy);
        ex.process_trade(&mut t, &mut q).unwrap();

        assert_eq!(q.len(), 1);
        assert_eq!(ex.sell_book().len(), 1);
        assert!(ex.sell_book().contains(OrderId(2)));
        assert!(is_near(t.amount, 4.0));
    }

    #[test]
    fn marketable_buy_takes_trade_price_and_taker_fee() {
        let mut ex = exchange();
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::market(OrderId(1), Side::Buy, 2.0), &mut q).unwrap();
        ex.create_order(0, Order::new(OrderId(2), Side::Buy, 90.0, 1.0), &mut q).unwrap();
        assert!(is_near(ex.cash_locked(), 90.0));

        let mut t = trade(1, 100.0, 3.0, Side::Sell);
        ex.process_trade(&mut t, &mut q).unwrap();

        assert!(is_near(ex.coin(), 2.0 * 0.998));
        assert!(is_near(ex.cash(), 1_000.0 - 200.0));
        assert!(is_near(ex.cash_locked(), 90.0));
        assert!(is_near(ex.volume(), 200.0));
        assert_eq!(q.iter().next().map(|e| e.event.kind()), Some(EventKind::Executed));
        // The limit buy at 90 is below the trade price and stays.
        assert!(ex.buy_book().contains(OrderId(2)));
    }

    #[test]
    fn limit_buy_fills_at_its_own_price() {
        let mut ex = exchange();
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::new(OrderId(1), Side::Buy, 100.0, 1.0), &mut q).unwrap();

        let mut t = trade(1, 99.0, 1.0, Side::Sell);
        ex.process_trade(&mut t, &mut q).unwrap();

        assert!(is_near(ex.coin(), 0.999));
        assert!(is_near(ex.cash(), 900.0));
        assert!(is_near(ex.cash_locked(), 0.0));
        assert_eq!(ex.snapshot(99.0).holdings, ex.coin());
    }

    #[test]
    fn untagged_trade_crosses_nothing() {
        let mut ex = exchange();
        let mut q = EventQueue::new(10);
        ex.create_order(0, Order::market(OrderId(1), Side::Buy, 1.0), &mut q).unwrap();
        let mut t = trade(1, 100.0, 1.0, Side::Unknown);
        ex.process_trade(&mut t, &mut q).unwrap();
        assert_eq!(ex.coin(), 0.0);
        assert_eq!(t.amount, 1.0);
    }

    #[test]
    fn cancel_sell_is_unsupported() {
        let mut ex = exchange();
        let sell = Order::new(OrderId(9), Side::Sell, 100.0, 1.0);
        assert!(matches!(
            ex.cancel_order(0, &sell),
            Err(SimError::UnsupportedCancel { side: Side::Sell, id: OrderId(9) })
        ));
    }

    #[test]
    fn snapshot_marks_all_coin() {
        let mut ex = exchange();
        ex.coin = 1.0;
        ex.coin_locked = 0.5;
        let snap = ex.snapshot(200.0);
        assert_eq!(snap.holdings, 1.5);
        assert_eq!(snap.value, 1_000.0 + 300.0);
    }
}
