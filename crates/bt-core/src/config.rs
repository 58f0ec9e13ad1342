//! Configuration for a simulation run.
//!
//! Every field has a default, so an empty JSON object is a valid config. The
//! runner loads an optional file, applies command-line overrides on top and
//! calls [`SimConfig::validate`] before building anything.
//!
//! # Example config
//!
//! ```json
//! {
//!   "delay": 10,
//!   "max_trades": 500000,
//!   "grid": { "budget": 6000, "notional": 200, "step": 1.025 },
//!   "momentum": { "use_ratio_flow": true, "position_life_time": 3600 }
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::SimError;

/// Top-level run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Propagation delay in seconds between a decision and its effect.
    pub delay: i64,

    /// Stop after this many trades have been processed.
    pub max_trades: Option<u64>,

    /// Grid strategy on a spot exchange.
    pub grid: GridConfig,

    /// Momentum strategy on a margin exchange.
    pub momentum: MomentumConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { delay: 10, max_trades: None, grid: GridConfig::default(), momentum: MomentumConfig::default() }
    }
}

impl SimConfig {
    /// Check the shared settings and both strategy sections.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.delay < 0 {
            return Err(SimError::Config(format!("delay must be >= 0, got {}", self.delay)));
        }
        if self.max_trades == Some(0) {
            return Err(SimError::Config("max_trades must be positive when set".into()));
        }
        self.grid.validate()?;
        self.momentum.validate()
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Grid bot and spot exchange settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Starting cash.
    pub budget: f64,

    /// Quote value of one ladder rung.
    pub notional: f64,

    /// Price ratio between adjacent rungs.
    pub step: f64,

    /// Sell multiplier over the buy price. Defaults to `step²`.
    pub profit: Option<f64>,

    /// Buys that would take cash below this level are dropped.
    /// Defaults to `budget - 50 × notional`.
    pub cash_floor: Option<f64>,

    pub maker_fee: f64,
    pub taker_fee: f64,

    /// Minimum seconds between two chase buys.
    pub chase_interval: i64,

    /// Resting buys above this count are canceled, cheapest first.
    pub max_resting_buys: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            budget: 6_000.0,
            notional: 200.0,
            step: 1.025,
            profit: None,
            cash_floor: None,
            maker_fee: 0.001,
            taker_fee: 0.002,
            chase_interval: 60,
            max_resting_buys: 3,
        }
    }
}

impl GridConfig {
    /// Effective sell multiplier.
    pub fn profit_multiplier(&self) -> f64 {
        self.profit.unwrap_or(self.step * self.step)
    }

    /// Effective cash floor for buy reservations.
    pub fn effective_cash_floor(&self) -> f64 {
        self.cash_floor.unwrap_or(self.budget - self.notional * 50.0)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        positive("grid.budget", self.budget)?;
        positive("grid.notional", self.notional)?;
        if self.step <= 1.0 {
            return Err(SimError::Config(format!("grid.step must be > 1, got {}", self.step)));
        }
        if self.profit_multiplier() <= 1.0 {
            return Err(SimError::Config(format!(
                "grid.profit must be > 1, got {}",
                self.profit_multiplier()
            )));
        }
        fee("grid.maker_fee", self.maker_fee)?;
        fee("grid.taker_fee", self.taker_fee)?;
        if self.chase_interval < 0 {
            return Err(SimError::Config("grid.chase_interval must be >= 0".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Momentum
// ---------------------------------------------------------------------------

/// Momentum bot and margin exchange settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// Starting cash.
    pub budget: f64,

    /// Coin amount of every position.
    pub amount: f64,

    /// Ratio above which the trailing stop is armed.
    pub take_profit_ratio: f64,

    /// Distance of the trailing stop below the best ratio seen.
    pub trailing_stop_diff: f64,

    /// Ratio below which the position is closed (negative).
    pub stop_loss_ratio: f64,

    /// Re-entry delay after a win, and the starting point after losses.
    pub init_backoff: i64,

    /// Upper bound of the doubling re-entry delay.
    pub max_backoff: i64,

    pub taker_fee: f64,

    /// Enable stop-loss / trailing-stop exits.
    pub use_ratio_flow: bool,

    /// Close a position that has not made a new high for this many seconds.
    /// `0` disables the life-time exit.
    pub position_life_time: i64,

    /// Seconds between two price checks.
    pub check_price_interval: i64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            budget: 10_000.0,
            amount: 1.0,
            take_profit_ratio: 0.02,
            trailing_stop_diff: 0.01,
            stop_loss_ratio: -0.01,
            init_backoff: 600,
            max_backoff: 86_400,
            taker_fee: 0.002,
            use_ratio_flow: false,
            position_life_time: 0,
            check_price_interval: 30,
        }
    }
}

impl MomentumConfig {
    /// Life-time exit duration, if enabled.
    pub fn life_time(&self) -> Option<i64> {
        (self.position_life_time > 0).then_some(self.position_life_time)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        positive("momentum.budget", self.budget)?;
        positive("momentum.amount", self.amount)?;
        fee("momentum.taker_fee", self.taker_fee)?;
        if self.trailing_stop_diff < 0.0 {
            return Err(SimError::Config("momentum.trailing_stop_diff must be >= 0".into()));
        }
        if self.init_backoff <= 0 || self.max_backoff < self.init_backoff {
            return Err(SimError::Config(format!(
                "momentum backoff must satisfy 0 < init ({}) <= max ({})",
                self.init_backoff, self.max_backoff
            )));
        }
        if self.position_life_time < 0 || self.check_price_interval < 0 {
            return Err(SimError::Config("momentum intervals must be >= 0".into()));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), SimError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SimError::Config(format!("{name} must be positive, got {value}")))
    }
}

fn fee(name: &str, value: f64) -> Result<(), SimError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::Config(format!("{name} must be in [0, 1), got {value}")))
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<SimConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: SimConfig = serde_json::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}
