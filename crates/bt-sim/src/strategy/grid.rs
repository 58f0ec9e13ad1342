//! Grid strategy: a ladder of limit orders around the last fill.
//!
//! Every rung is worth `notional` of quote currency. A filled buy at `p` is
//! answered by the next buy one step lower and a sell at `p × profit`; a
//! filled sell at `p` by a buy at `p / profit` and the next sell one step
//! higher. Fills that do not carry the expected rung notional (chase buys,
//! for one) get no answer.
//!
//! When free coin runs low the bot "chases": a marketable buy sized to bring
//! inventory back up, at most once per `chase_interval`.

use bt_core::approx::is_near;
use bt_core::config::GridConfig;
use bt_core::error::SimError;
use bt_core::{Order, OrderId, Side};
use tracing::debug;

use crate::Strategy;
use crate::book::OrderBook;
use crate::event::{Event, EventQueue};
use crate::exchange::SpotExchange;

/// Rungs of free coin below which a chase is triggered.
const CHASE_THRESHOLD_UNITS: f64 = 3.0;

/// Extra rungs bought on top of the shortfall when chasing.
const CHASE_EXTRA_UNITS: i64 = 2;

/// Grid bot trading on a [`SpotExchange`].
#[derive(Debug, Clone)]
pub struct GridBot {
    notional: f64,
    step: f64,
    profit: f64,
    chase_interval: i64,
    max_resting_buys: usize,
    buy_orders: OrderBook,
    sell_orders: OrderBook,
    last_chase: i64,
    next_id: u64,
}

impl GridBot {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            notional: config.notional,
            step: config.step,
            profit: config.profit_multiplier(),
            chase_interval: config.chase_interval,
            max_resting_buys: config.max_resting_buys,
            buy_orders: OrderBook::new(),
            sell_orders: OrderBook::new(),
            last_chase: 0,
            next_id: 0,
        }
    }

    /// Limit buys the bot believes are resting.
    pub fn buy_orders(&self) -> &OrderBook {
        &self.buy_orders
    }

    /// Sells the bot believes are resting or pending.
    pub fn sell_orders(&self) -> &OrderBook {
        &self.sell_orders
    }

    fn next_order_id(&mut self) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Place a limit order sized to `amount`.
    fn place(&mut self, now: i64, side: Side, price: f64, amount: f64, queue: &mut EventQueue) {
        let order = Order::new(self.next_order_id(), side, price, amount);
        self.create_order(now, order, queue);
    }

    fn create_order(&mut self, now: i64, order: Order, queue: &mut EventQueue) {
        let book = match order.side {
            Side::Buy => &mut self.buy_orders,
            _ => &mut self.sell_orders,
        };
        if book.find_equivalent(order.original_amount).is_some() {
            debug!("[grid] #{now} skip duplicate {} {:.8}@{:.8}", order.side, order.amount, order.price);
            return;
        }
        if !order.is_marketable() {
            book.insert(order);
        }
        debug!("[grid] #{now} create {} id={} {:.8}@{:.8}", order.side, order.id, order.amount, order.price);
        queue.schedule(now, Event::CreateOrder(order));
    }

    fn cancel_order(&mut self, now: i64, order: Order, queue: &mut EventQueue) {
        debug!("[grid] #{now} cancel {} id={} {:.8}@{:.8}", order.side, order.id, order.amount, order.price);
        queue.schedule(now, Event::CancelOrder(order));
    }

    /// Buy coin at market when free inventory is below the threshold.
    fn may_chase_coin(&mut self, now: i64, price: f64, exchange: &SpotExchange, queue: &mut EventQueue) {
        if self.last_chase + self.chase_interval > now {
            return;
        }
        let coin = exchange.coin();
        if coin > self.notional / price * CHASE_THRESHOLD_UNITS {
            return;
        }
        self.last_chase = now;
        let held_units = (coin * price / self.notional) as i64;
        let units = CHASE_THRESHOLD_UNITS as i64 - held_units + CHASE_EXTRA_UNITS;
        debug!("[grid] #{now} chase {units} units of coin");
        let order = Order::market(self.next_order_id(), Side::Buy, self.notional / price * units as f64);
        self.create_order(now, order, queue);
    }

    /// Cancel the cheapest resting buys until at most `max_resting_buys` remain.
    fn cap_resting_buys(&mut self, now: i64, queue: &mut EventQueue) {
        while self.buy_orders.len() > self.max_resting_buys {
            let Some(cheapest) = self.buy_orders.pop_front() else {
                break;
            };
            self.cancel_order(now, cheapest, queue);
        }
    }
}

impl Strategy for GridBot {
    type Exchange = SpotExchange;

    fn name(&self) -> &str {
        "grid"
    }

    fn init(&mut self, now: i64, price: f64, exchange: &SpotExchange, queue: &mut EventQueue) -> Result<(), SimError> {
        let buy_price = price / self.step;
        self.place(now, Side::Buy, buy_price, self.notional / buy_price, queue);

        self.may_chase_coin(now, price, exchange, queue);

        let sell_price = price * self.profit;
        self.place(now, Side::Sell, sell_price, self.notional / sell_price, queue);
        Ok(())
    }

    fn on_executed(
        &mut self,
        now: i64,
        order: Order,
        exchange: &SpotExchange,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        debug!(
            "[grid] #{now} executed {} {:.8}@{:.8} ({:.6} quote)",
            order.side,
            order.original_amount,
            order.price,
            order.notional()
        );

        match order.side {
            Side::Sell => {
                self.sell_orders.remove(order.id);
                if !is_near(self.notional * self.profit, order.notional()) {
                    return Ok(());
                }
                let buy_price = order.price / self.profit;
                self.place(now, Side::Buy, buy_price, self.notional / buy_price, queue);

                self.may_chase_coin(now, order.price, exchange, queue);

                let sell_price = order.price * self.step;
                self.place(now, Side::Sell, sell_price, order.original_amount / self.step, queue);
            }
            Side::Buy => {
                self.buy_orders.remove(order.id);
                if !is_near(self.notional, order.notional()) {
                    return Ok(());
                }
                let buy_price = order.price / self.step;
                self.place(now, Side::Buy, buy_price, self.notional / buy_price, queue);

                self.may_chase_coin(now, order.price, exchange, queue);

                let sell_price = order.price * self.profit;
                self.place(now, Side::Sell, sell_price, order.original_amount, queue);
            }
            Side::Unknown => {
                return Err(SimError::Invariant(format!("executed order {} has no side", order.id)));
            }
        }

        self.cap_resting_buys(now, queue);
        Ok(())
    }
}
