//! # bt-runner
//!
//! Command-line entry point for the trade-tape backtester.
//!
//! Builds a [`SimConfig`] from defaults, an optional JSON file and command
//! line overrides (in that order), replays the given tape files through the
//! chosen strategy and prints a summary.
//!
//! # Usage
//!
//! ```bash
//! bt-runner -v grid -a 200 -s 1.025 data/btcusd-2016-*.bin
//! bt-runner --config run.json momentum -r -l -0.02 -o 3600 data/*.bin
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use bt_core::config::{SimConfig, load_config};
use bt_core::logging::{effective_level, init_logging};
use bt_sim::driver::{Report, Simulation};
use bt_sim::exchange::{MarginExchange, SpotExchange};
use bt_sim::strategy::{GridBot, MomentumBot};
use bt_sim::Strategy;
use bt_tape::TapeReader;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

/// Trade-tape strategy backtester.
#[derive(Parser, Debug)]
#[command(name = "bt-runner", about = "Replay a trade tape through a simulated exchange and strategy")]
struct Cli {
    /// Configuration file path (JSON). Command-line options override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Verbose progress (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Propagation delay in seconds.
    #[arg(short, long)]
    delay: Option<i64>,

    /// Stop after this many trades.
    #[arg(short = 'n', long)]
    max_trades: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grid strategy on a spot exchange.
    Grid(GridArgs),
    /// Momentum strategy on a margin exchange.
    Momentum(MomentumArgs),
}

#[derive(Args, Debug)]
struct GridArgs {
    /// Starting cash.
    #[arg(short, long)]
    budget: Option<f64>,

    /// Quote value of one ladder rung.
    #[arg(short = 'a', long)]
    notional: Option<f64>,

    /// Price ratio between adjacent rungs.
    #[arg(short, long)]
    step: Option<f64>,

    /// Sell multiplier over the buy price (default: step²).
    #[arg(short, long)]
    profit: Option<f64>,

    #[arg(short = 'm', long)]
    maker_fee: Option<f64>,

    #[arg(short = 't', long)]
    taker_fee: Option<f64>,

    /// Buys that would take cash below this level are dropped.
    #[arg(long, allow_negative_numbers = true)]
    cash_floor: Option<f64>,

    /// Tape files, replayed in order.
    #[arg(required = true)]
    tapes: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct MomentumArgs {
    /// Starting cash.
    #[arg(short, long)]
    budget: Option<f64>,

    /// Coin amount of every position.
    #[arg(short, long)]
    amount: Option<f64>,

    #[arg(short = 't', long)]
    taker_fee: Option<f64>,

    /// Ratio above which the trailing stop is armed.
    #[arg(short = 'p', long)]
    take_profit: Option<f64>,

    /// Distance of the trailing stop below the best ratio.
    #[arg(short = 's', long)]
    trailing_diff: Option<f64>,

    /// Ratio below which the position is closed.
    #[arg(short = 'l', long, allow_negative_numbers = true)]
    stop_loss: Option<f64>,

    /// Initial re-entry backoff in seconds.
    #[arg(short = 'w', long)]
    init_backoff: Option<i64>,

    /// Maximum re-entry backoff in seconds.
    #[arg(short = 'm', long)]
    max_backoff: Option<i64>,

    /// Enable stop-loss / trailing-stop exits.
    #[arg(short = 'r', long)]
    ratio_flow: bool,

    /// Close a position without a new high for this many seconds.
    #[arg(short = 'o', long)]
    life_time: Option<i64>,

    /// Seconds between price checks.
    #[arg(short = 'c', long)]
    check_interval: Option<i64>,

    /// Tape files, replayed in order.
    #[arg(required = true)]
    tapes: Vec<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of `config`.
    fn apply(&self, config: &mut SimConfig) {
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if self.max_trades.is_some() {
            config.max_trades = self.max_trades;
        }
        match &self.command {
            Command::Grid(args) => args.apply(config),
            Command::Momentum(args) => args.apply(config),
        }
    }
}

impl GridArgs {
    fn apply(&self, config: &mut SimConfig) {
        let grid = &mut config.grid;
        set(&mut grid.budget, self.budget);
        set(&mut grid.notional, self.notional);
        set(&mut grid.step, self.step);
        set(&mut grid.maker_fee, self.maker_fee);
        set(&mut grid.taker_fee, self.taker_fee);
        if self.profit.is_some() {
            grid.profit = self.profit;
        }
        if self.cash_floor.is_some() {
            grid.cash_floor = self.cash_floor;
        }
    }
}

impl MomentumArgs {
    fn apply(&self, config: &mut SimConfig) {
        let momentum = &mut config.momentum;
        set(&mut momentum.budget, self.budget);
        set(&mut momentum.amount, self.amount);
        set(&mut momentum.taker_fee, self.taker_fee);
        set(&mut momentum.take_profit_ratio, self.take_profit);
        set(&mut momentum.trailing_stop_diff, self.trailing_diff);
        set(&mut momentum.stop_loss_ratio, self.stop_loss);
        set(&mut momentum.init_backoff, self.init_backoff);
        set(&mut momentum.max_backoff, self.max_backoff);
        set(&mut momentum.position_life_time, self.life_time);
        set(&mut momentum.check_price_interval, self.check_interval);
        if self.ratio_flow {
            momentum.use_ratio_flow = true;
        }
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    init_logging(effective_level(&cli.log_level, cli.verbose), cli.log_dir.as_deref(), "bt-runner")?;

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    // 2. Load configuration
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SimConfig::default(),
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;
    info!("config ready: delay={}s, max_trades={:?}", config.delay, config.max_trades);

    // 3. Build and replay
    let report = match &cli.command {
        Command::Grid(args) => {
            let grid = &config.grid;
            let exchange =
                SpotExchange::new(grid.budget, grid.maker_fee, grid.taker_fee, grid.effective_cash_floor());
            let sim = Simulation::new(exchange, GridBot::new(grid), config.delay, grid.budget);
            replay(sim.with_max_trades(config.max_trades), &args.tapes)?
        }
        Command::Momentum(args) => {
            let momentum = &config.momentum;
            let exchange = MarginExchange::new(momentum.budget, momentum.taker_fee);
            let sim = Simulation::new(exchange, MomentumBot::new(momentum), config.delay, momentum.budget);
            replay(sim.with_max_trades(config.max_trades), &args.tapes)?
        }
    };

    // 4. Report
    println!("{report}");
    Ok(())
}

fn replay<S: Strategy>(mut sim: Simulation<S>, tapes: &[PathBuf]) -> Result<Report> {
    let mut reader = TapeReader::new(tapes.iter().cloned());
    let report = sim.run(reader.by_ref()).context("simulation aborted")?;
    info!(
        "replayed {} trades ({} records read, {} known-bad skipped)",
        report.trades,
        reader.records_read(),
        reader.records_skipped()
    );
    Ok(report)
}
