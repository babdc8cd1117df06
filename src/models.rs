use crate::error::{EngineError, EngineResult};
use crate::strategy::StrategyConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Column-oriented OHLCV series for one instrument.
///
/// Every column is expected to have the same length and `date` must be
/// strictly increasing. Producers are not trusted to uphold this, so
/// consumers call [`CandleSeries::validate`] before relying on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    #[serde(default)]
    pub symbol: String,
    pub date: Vec<DateTime<Utc>>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, candle: &Candle) {
        self.date.push(candle.date);
        self.open.push(candle.open);
        self.high.push(candle.high);
        self.low.push(candle.low);
        self.close.push(candle.close);
        self.volume.push(candle.volume);
    }

    /// Number of bars, taken from the close column.
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Checks that the series is non-empty and every column matches the close column.
    pub fn validate_lengths(&self) -> EngineResult<()> {
        let n = self.close.len();
        if n == 0 {
            return Err(EngineError::MalformedSeries {
                reason: "series is empty".to_string(),
            });
        }
        let columns = [
            ("date", self.date.len()),
            ("open", self.open.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
            ("volume", self.volume.len()),
        ];
        if let Some((name, len)) = columns.iter().find(|(_, len)| *len != n) {
            return Err(EngineError::MalformedSeries {
                reason: format!(
                    "input series lengths mismatch: close={} {}={}",
                    n, name, len
                ),
            });
        }
        Ok(())
    }

    /// Length check plus strict timestamp ordering.
    pub fn validate(&self) -> EngineResult<()> {
        self.validate_lengths()?;
        if let Some(index) = self
            .date
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
        {
            return Err(EngineError::UnsortedSeries { index: index + 1 });
        }
        Ok(())
    }
}

/// An open long position in the backtest ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTrade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub pnl: f64,
    /// Closed by the end-of-run liquidation rather than a sell signal.
    pub forced: bool,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn validate(&self, name: &str) -> EngineResult<()> {
        let reason = if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            Some("bounds and step must be finite")
        } else if self.step <= 0.0 {
            Some("step must be positive")
        } else if self.max < self.min {
            Some("max is below min")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(EngineError::InvalidRange {
                name: name.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Grid points `min + k * step`, inclusive of `max` up to a small tolerance.
    ///
    /// Each point is computed from `k` directly so rounding never accumulates
    /// across steps.
    pub fn values(&self, name: &str) -> EngineResult<Vec<f64>> {
        self.validate(name)?;
        let limit = self.max + self.step * 1e-6;
        let mut values = Vec::new();
        let mut k = 0usize;
        loop {
            let value = self.min + k as f64 * self.step;
            if value > limit {
                break;
            }
            values.push(value.min(self.max));
            k += 1;
        }
        Ok(values)
    }

    /// Number of grid points, or 0 when the range is invalid.
    pub fn count(&self) -> usize {
        if self.validate("").is_err() {
            return 0;
        }
        (((self.max - self.min) / self.step + 1e-6).floor() as usize).saturating_add(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPerformance {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub max_drawdown: f64,
    pub avg_trade_pnl: f64,
    pub median_trade_pnl: f64,
    pub trade_pnl_std_dev: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub forced_closes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub config: StrategyConfig,
    pub profit: f64,
    pub trades: usize,
    pub win_rate: f64,
    pub win_rate_percent: f64,
    pub drawdown: f64,
    pub equity_curve: Vec<f64>,
    pub buy_count: usize,
    pub sell_count: usize,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Optimization Result ===")?;
        writeln!(f, "Config: {}", self.config)?;
        writeln!(f, "Profit: {:.2}", self.profit)?;
        writeln!(f, "Trades: {}", self.trades)?;
        writeln!(f, "WinRate: {:.2}%", self.win_rate_percent)?;
        writeln!(f, "Drawdown: {:.2}", self.drawdown)?;
        write!(f, "Signals: {} buy / {} sell", self.buy_count, self.sell_count)
    }
}
