//! The simulation clock.
//!
//! For every tape trade, in order:
//!
//! 1. reject a timestamp earlier than the clock, then advance the clock,
//! 2. on the first trade, let the strategy place its initial orders,
//! 3. drain the events due by now (at most the ones queued when the pass
//!    started; anything scheduled during the pass waits for the next trade),
//! 4. schedule a price check if the strategy wants one and it is time,
//! 5. let the exchange match the trade,
//! 6. stop early on a negative account value or the trade limit.

use bt_core::Trade;
use bt_core::error::SimError;
use tracing::{debug, info};

use crate::event::{Event, EventQueue};
use crate::{AccountSnapshot, MatchingEngine, Strategy};

const SECONDS_PER_DAY: i64 = 86_400;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every trade was replayed.
    EndOfTape,
    /// The account value went negative.
    Bankrupt,
    /// The configured trade count was reached.
    TradeLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfTape => write!(f, "end of tape"),
            Self::Bankrupt => write!(f, "lost all the money"),
            Self::TradeLimit => write!(f, "trade limit reached"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub strategy: String,
    pub exchange: String,
    pub budget: f64,
    pub trades: u64,
    pub first_price: Option<f64>,
    pub last_price: Option<f64>,
    /// Account marked at the last price.
    pub account: AccountSnapshot,
    pub volume: f64,
    pub stop: StopReason,
}

impl Report {
    /// Ending value over starting budget.
    pub fn value_ratio(&self) -> f64 {
        self.account.value / self.budget
    }

    /// Last price over first price, if any trade was replayed.
    pub fn price_ratio(&self) -> Option<f64> {
        Some(self.last_price? / self.first_price?)
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "simulation done: {} ({} trades, {} on {})", self.stop, self.trades, self.strategy, self.exchange)?;
        writeln!(
            f,
            "cash={:.6}, holdings={:.8}, total value={:.6}; ratio={:.6}",
            self.account.cash,
            self.account.holdings,
            self.account.value,
            self.value_ratio()
        )?;
        writeln!(f, "volume={:.6}", self.volume)?;
        match (self.first_price, self.last_price, self.price_ratio()) {
            (Some(first), Some(last), Some(ratio)) => {
                write!(f, "init_price={first:.8}, last_price={last:.8}, ratio={ratio:.6}")
            }
            _ => write!(f, "no trades replayed"),
        }
    }
}

/// A single run of one strategy against one exchange.
pub struct Simulation<S: Strategy> {
    exchange: S::Exchange,
    strategy: S,
    queue: EventQueue,
    budget: f64,
    max_trades: Option<u64>,

    clock: i64,
    /// Time and price of the first trade.
    start: Option<(i64, f64)>,
    last_price: Option<f64>,
    last_check: i64,
    last_day: Option<i64>,
    last_account: (f64, f64),
    trades: u64,
}

impl<S: Strategy> Simulation<S> {
    /// Create a run. `budget` is the cash the exchange was funded with and is
    /// only used for reporting.
    pub fn new(exchange: S::Exchange, strategy: S, delay: i64, budget: f64) -> Self {
        let account = exchange.snapshot(0.0);
        Self {
            exchange,
            strategy,
            queue: EventQueue::new(delay),
            budget,
            max_trades: None,
            clock: 0,
            start: None,
            last_price: None,
            last_check: 0,
            last_day: None,
            last_account: (account.cash, account.holdings),
            trades: 0,
        }
    }

    /// Stop after `max_trades` trades.
    pub fn with_max_trades(mut self, max_trades: Option<u64>) -> Self {
        self.max_trades = max_trades;
        self
    }

    pub fn exchange(&self) -> &S::Exchange {
        &self.exchange
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn clock(&self) -> i64 {
        self.clock
    }

    /// Trades processed so far.
    pub fn trades(&self) -> u64 {
        self.trades
    }

    /// Replay every trade of `tape`, stopping at the first error or early stop.
    pub fn run<I>(&mut self, tape: I) -> Result<Report, SimError>
    where
        I: IntoIterator<Item = Result<Trade, SimError>>,
    {
        info!(
            "[sim] starting {} on {} with budget {:.2}",
            self.strategy.name(),
            self.exchange.name(),
            self.budget
        );
        for trade in tape {
            if let Some(stop) = self.step(trade?)? {
                info!("[sim] stopped early after {} trades: {stop}", self.trades);
                return Ok(self.report(stop));
            }
        }
        Ok(self.report(StopReason::EndOfTape))
    }

    /// Process one trade. Returns a stop reason when the run should end.
    pub fn step(&mut self, mut trade: Trade) -> Result<Option<StopReason>, SimError> {
        let now = trade.time;
        if self.start.is_some() && now < self.clock {
            return Err(SimError::NonMonotonicTime { clock: self.clock, time: now });
        }
        self.clock = now;
        self.last_price = Some(trade.price);

        let (first_time, _) = match self.start {
            Some(start) => start,
            None => {
                self.start = Some((now, trade.price));
                info!("[sim] #{now} first trade at {:.8}", trade.price);
                self.strategy.init(now, trade.price, &self.exchange, &mut self.queue)?;
                (now, trade.price)
            }
        };

        let day = (now - first_time) / SECONDS_PER_DAY;
        if self.last_day != Some(day) {
            debug!("[sim] day={day} ----------------------------- last_price={:.8}", trade.price);
            self.last_day = Some(day);
        }

        self.drain(now)?;

        if let Some(interval) = self.strategy.price_check_interval() {
            if now - self.last_check > interval {
                self.queue.schedule(now, Event::CheckPrice { price: trade.price });
                self.last_check = now;
            }
        }

        self.exchange.process_trade(&mut trade, &mut self.queue)?;
        self.trades += 1;

        let account = self.exchange.snapshot(trade.price);
        if (account.cash, account.holdings) != self.last_account {
            debug!(
                "[sim] #{now} price={:.8}: {account}; buys {} sells {}",
                trade.price,
                self.exchange.buy_book(),
                self.exchange.sell_book()
            );
            self.last_account = (account.cash, account.holdings);
        }

        if account.value < 0.0 {
            return Ok(Some(StopReason::Bankrupt));
        }
        if self.max_trades == Some(self.trades) {
            return Ok(Some(StopReason::TradeLimit));
        }
        Ok(None)
    }

    /// Dispatch the events due at `now` that were queued before this pass.
    fn drain(&mut self, now: i64) -> Result<(), SimError> {
        for _ in 0..self.queue.len() {
            let Some(event) = self.queue.pop_due(now) else {
                break;
            };
            match event {
                Event::CreateOrder(order) => self.exchange.create_order(now, order, &mut self.queue)?,
                Event::CancelOrder(order) => self.exchange.cancel_order(now, &order)?,
                Event::Executed(order) => {
                    self.strategy.on_executed(now, order, &self.exchange, &mut self.queue)?;
                }
                Event::CheckPrice { price } => {
                    self.strategy.on_check_price(now, price, &self.exchange, &mut self.queue)?;
                }
            }
        }
        Ok(())
    }

    /// Summarize the run as of the last trade.
    pub fn report(&self, stop: StopReason) -> Report {
        let mark = self.last_price.unwrap_or(0.0);
        Report {
            strategy: self.strategy.name().to_string(),
            exchange: self.exchange.name().to_string(),
            budget: self.budget,
            trades: self.trades,
            first_price: self.start.map(|(_, price)| price),
            last_price: self.last_price,
            account: self.exchange.snapshot(mark),
            volume: self.exchange.volume(),
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use bt_core::approx::is_near;
    use bt_core::config::{GridConfig, MomentumConfig};
    use bt_core::{PositionSide, Side};

    use super::*;
    use crate::event::EventKind;
    use crate::exchange::{MarginExchange, SpotExchange};
    use crate::strategy::{GridBot, MomentumBot};

    fn tape(trades: &[(i64, f64, Side)]) -> Vec<Result<Trade, SimError>> {
        trades
            .iter()
            .enumerate()
            .map(|(i, &(time, price, side))| Ok(Trade::new(time, i as u32, price, 5.0, side)))
            .collect()
    }

    fn grid_sim(config: &GridConfig, delay: i64) -> Simulation<GridBot> {
        let exchange =
            SpotExchange::new(config.budget, config.maker_fee, config.taker_fee, config.effective_cash_floor());
        Simulation::new(exchange, GridBot::new(config), delay, config.budget)
    }

    fn momentum_sim(config: &MomentumConfig, delay: i64) -> Simulation<MomentumBot> {
        let exchange = MarginExchange::new(config.budget, config.taker_fee);
        Simulation::new(exchange, MomentumBot::new(config), delay, config.budget)
    }

    #[test]
    fn grid_constant_price_places_two_rungs_and_fills_nothing() {
        let config = GridConfig::default();
        let mut sim = grid_sim(&config, 10);
        let report = sim.run(tape(&[(100, 100.0, Side::Buy), (110, 100.0, Side::Buy), (120, 100.0, Side::Buy)])).unwrap();

        let bot = sim.strategy();
        assert_eq!(bot.buy_orders().len(), 1);
        assert_eq!(bot.sell_orders().len(), 1);
        let buy = bot.buy_orders().front().copied().unwrap();
        let sell = bot.sell_orders().front().copied().unwrap();
        assert!(is_near(buy.price, 100.0 / 1.025));
        assert!(is_near(buy.amount, 200.0 / buy.price));
        assert!(is_near(sell.price, 100.0 * 1.025 * 1.025));
        assert!(is_near(sell.amount, 200.0 / sell.price));

        let ex = sim.exchange();
        assert_eq!(ex.coin(), 0.0);
        assert_eq!(ex.cash(), 6_000.0);
        assert_eq!(ex.volume(), 0.0);
        // The sell waits for coin and keeps being retried.
        assert!(ex.sell_book().is_empty());
        assert_eq!(sim.queue().iter().map(|e| e.event.kind()).collect::<Vec<_>>(), vec![EventKind::CreateOrder]);

        assert_eq!(report.trades, 3);
        assert_eq!(report.stop, StopReason::EndOfTape);
        assert_eq!(report.account.value, 6_000.0);
        assert_eq!(report.price_ratio(), Some(1.0));
    }

    #[test]
    fn grid_chase_buys_then_sell_rests() {
        let config = GridConfig::default();
        let mut sim = grid_sim(&config, 10);
        sim.run(tape(&[(100, 100.0, Side::Buy), (110, 100.0, Side::Sell), (120, 100.0, Side::Buy), (130, 100.0, Side::Buy)]))
            .unwrap();

        let ex = sim.exchange();
        // Chase of 5 rungs at 100, filled by the 5.0 sell trade with the taker fee.
        assert!(is_near(ex.coin() + ex.coin_locked(), 5.0 * 0.998));
        assert!(is_near(ex.cash(), 6_000.0 - 500.0));
        assert_eq!(ex.sell_book().len(), 1);
        assert!(is_near(ex.volume(), 500.0));
    }

    #[test]
    fn momentum_stop_loss_reopens_opposite_side_after_backoff() {
        let config = MomentumConfig { use_ratio_flow: true, ..MomentumConfig::default() };
        let mut sim = momentum_sim(&config, 10);

        let report = sim
            .run(tape(&[
                (1_000, 100.0, Side::Sell),
                (1_010, 100.0, Side::Sell),
                (1_020, 95.0, Side::Sell),
                (1_031, 95.0, Side::Sell),
                (1_041, 95.0, Side::Buy),
                (1_051, 95.0, Side::Buy),
                (1_061, 95.0, Side::Buy),
            ]))
            .unwrap();

        assert!(sim.exchange().position().is_flat());
        let closed = sim.exchange().last_closed().copied().unwrap();
        assert_eq!(closed.side, PositionSide::Long);
        assert!(is_near(closed.gain(), 95.0 * 0.998 - 100.0 * 1.002));
        assert!(is_near(report.account.cash, 10_000.0 + closed.gain()));

        let bot = sim.strategy();
        assert_eq!(bot.backoff(), 1_200);
        assert_eq!(bot.next_side(), PositionSide::Short);

        // Noticed at 1061, reopened 1200 later, delivered one delay after that.
        let reopen = sim.queue().iter().next().cloned().unwrap();
        assert_eq!(reopen.due, 1_061 + 1_200 + 10);
        match reopen.event {
            Event::CreateOrder(o) => assert_eq!(o.side, Side::Sell),
            other => panic!("unexpected {other:?}"),
        }

        sim.step(Trade::new(2_270, 9, 95.0, 5.0, Side::Buy)).unwrap();
        assert!(sim.exchange().position().is_flat());
        sim.step(Trade::new(2_271, 10, 95.0, 5.0, Side::Buy)).unwrap();
        assert_eq!(sim.exchange().position().side, PositionSide::Short);
        assert_eq!(sim.exchange().position().amount, -1.0);
    }

    #[test]
    fn time_going_backwards_is_fatal() {
        let mut sim = grid_sim(&GridConfig::default(), 10);
        let err = sim.run(tape(&[(10, 100.0, Side::Buy), (5, 100.0, Side::Buy)])).unwrap_err();
        assert!(matches!(err, SimError::NonMonotonicTime { clock: 10, time: 5 }));
    }

    #[test]
    fn tape_error_is_propagated() {
        let mut sim = grid_sim(&GridConfig::default(), 10);
        let mut trades = tape(&[(10, 100.0, Side::Buy)]);
        trades.push(Err(SimError::Invariant("broken tape".into())));
        assert!(sim.run(trades).is_err());
        assert_eq!(sim.trades(), 1);
    }

    #[test]
    fn negative_value_stops_the_run() {
        let config = MomentumConfig { budget: 1.0, ..MomentumConfig::default() };
        let mut sim = momentum_sim(&config, 10);
        let report = sim
            .run(tape(&[
                (0, 100.0, Side::Sell),
                (10, 100.0, Side::Sell),
                (20, 50.0, Side::Sell),
                (30, 50.0, Side::Sell),
            ]))
            .unwrap();

        assert_eq!(report.stop, StopReason::Bankrupt);
        assert_eq!(report.trades, 3);
        assert!(report.account.value < 0.0);
    }

    #[test]
    fn trade_limit_stops_the_run() {
        let mut sim = grid_sim(&GridConfig::default(), 10).with_max_trades(Some(2));
        let report = sim
            .run(tape(&[(1, 100.0, Side::Buy), (2, 100.0, Side::Buy), (3, 100.0, Side::Buy)]))
            .unwrap();
        assert_eq!(report.stop, StopReason::TradeLimit);
        assert_eq!(report.trades, 2);
        assert_eq!(sim.clock(), 2);
    }

    #[test]
    fn zero_delay_retry_does_not_spin() {
        let mut sim = grid_sim(&GridConfig::default(), 0);
        let stop = sim.step(Trade::new(100, 1, 100.0, 1.0, Side::Buy)).unwrap();
        assert_eq!(stop, None);
        // Buy, chase and sell were delivered; the sell retry waits for the next pass.
        assert_eq!(sim.queue().len(), 1);
        assert_eq!(sim.exchange().buy_book().len(), 2);
    }

    #[test]
    fn price_checks_follow_the_interval() {
        let mut sim = momentum_sim(&MomentumConfig::default(), 10);
        sim.step(Trade::new(100, 1, 100.0, 1.0, Side::Unknown)).unwrap();
        sim.step(Trade::new(130, 2, 100.0, 1.0, Side::Unknown)).unwrap();
        sim.step(Trade::new(131, 3, 100.0, 1.0, Side::Unknown)).unwrap();

        let kinds: Vec<EventKind> = sim.queue().iter().map(|e| e.event.kind()).collect();
        // Open order and first check were drained at 130; a second check at 131.
        assert_eq!(kinds, vec![EventKind::CheckPrice]);
        assert_eq!(sim.queue().peek_due(), Some(141));
    }

    #[test]
    fn empty_tape_report() {
        let mut sim = grid_sim(&GridConfig::default(), 10);
        let report = sim.run(Vec::<Result<Trade, SimError>>::new()).unwrap();
        assert_eq!(report.trades, 0);
        assert_eq!(report.price_ratio(), None);
        assert!(report.to_string().contains("no trades replayed"));
    }
}
