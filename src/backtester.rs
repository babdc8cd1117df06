use crate::error::EngineResult;
use crate::models::{CandleSeries, ClosedTrade, OptimizationResult, Position};
use crate::signals::{LastBarSignals, SignalIndex};
use crate::strategy::{create_strategy, SignalGenerator, StrategyConfig};
use chrono::{DateTime, Utc};
use log::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacktestOptions {
    /// Liquidate positions still open at the final bar's close.
    pub close_all_at_end: bool,
    /// Log every trade and the closing statistics.
    pub verbose: bool,
}

/// Outcome of replaying one generator's signals over a candle series.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub profit: f64,
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub max_drawdown: f64,
    /// Realized plus unrealized P&L at every bar.
    pub equity_curve: Vec<f64>,
    pub buy_count: usize,
    pub sell_count: usize,
    pub closed_trades: Vec<ClosedTrade>,
    /// Positions left open after the final bar.
    pub open_positions: Vec<Position>,
    pub last_bar: LastBarSignals,
}

impl BacktestReport {
    pub fn win_rate_percent(&self) -> f64 {
        self.win_rate * 100.0
    }

    pub fn into_result(self, config: StrategyConfig) -> OptimizationResult {
        OptimizationResult {
            config,
            profit: self.profit,
            trades: self.trades,
            win_rate: self.win_rate,
            win_rate_percent: self.win_rate * 100.0,
            drawdown: self.max_drawdown,
            equity_curve: self.equity_curve,
            buy_count: self.buy_count,
            sell_count: self.sell_count,
        }
    }
}

/// Running ledger of open positions and realized P&L.
#[derive(Debug, Default)]
struct Ledger {
    open: Vec<Position>,
    realized: f64,
    wins: usize,
    closed: Vec<ClosedTrade>,
}

impl Ledger {
    fn open(&mut self, price: f64, time: DateTime<Utc>) {
        self.open.push(Position {
            entry_price: price,
            entry_time: time,
        });
    }

    fn close_all(&mut self, price: f64, time: DateTime<Utc>, forced: bool) {
        for position in self.open.drain(..) {
            let pnl = price - position.entry_price;
            self.realized += pnl;
            if pnl > 0.0 {
                self.wins += 1;
            }
            self.closed.push(ClosedTrade {
                entry_time: position.entry_time,
                entry_price: position.entry_price,
                exit_time: time,
                exit_price: price,
                pnl,
                forced,
            });
        }
    }

    fn mark_to_market(&self, price: f64) -> f64 {
        self.realized
            + self
                .open
                .iter()
                .map(|position| price - position.entry_price)
                .sum::<f64>()
    }
}

/// Re-executes `generator` on `candles` and replays its signals bar by bar.
///
/// Every buy opens a new position at the bar's close and every sell closes
/// all open positions. Insufficient data is not an error here: the generator
/// simply produces no signals and the report is flat.
pub fn run_backtest(
    generator: &mut dyn SignalGenerator,
    candles: &CandleSeries,
    options: BacktestOptions,
) -> EngineResult<BacktestReport> {
    candles.validate()?;
    let last_bar = generator.execute(candles);

    let buys = SignalIndex::new(generator.buy_points());
    let sells = SignalIndex::new(generator.sell_points());

    let n = candles.len();
    let mut ledger = Ledger::default();
    let mut equity_curve = Vec::with_capacity(n);
    let mut peak = 0.0f64;
    let mut max_drawdown = 0.0f64;

    for i in 0..n {
        let date = candles.date[i];
        let price = candles.close[i];

        if buys.contains(&date) {
            ledger.open(price, date);
        }
        if sells.contains(&date) && !ledger.open.is_empty() {
            ledger.close_all(price, date, false);
        }

        let equity = ledger.mark_to_market(price);
        equity_curve.push(equity);
        peak = peak.max(equity);
        max_drawdown = max_drawdown.max(peak - equity);
    }

    if options.close_all_at_end && !ledger.open.is_empty() {
        if let (Some(&price), Some(&date)) = (candles.close.last(), candles.date.last()) {
            ledger.close_all(price, date, true);
            if let Some(last) = equity_curve.last_mut() {
                *last = ledger.realized;
            }
        }
    }

    let trades = ledger.closed.len();
    let win_rate = if trades > 0 {
        ledger.wins as f64 / trades as f64
    } else {
        0.0
    };

    let report = BacktestReport {
        profit: ledger.realized,
        trades,
        wins: ledger.wins,
        win_rate,
        max_drawdown,
        equity_curve,
        buy_count: generator.buy_points().len(),
        sell_count: generator.sell_points().len(),
        closed_trades: ledger.closed,
        open_positions: ledger.open,
        last_bar,
    };

    if options.verbose {
        log_trade_table(&report);
    }

    Ok(report)
}

/// Backtests a caller-supplied config once, without searching.
pub fn evaluate(
    config: &StrategyConfig,
    candles: &CandleSeries,
    options: BacktestOptions,
) -> EngineResult<OptimizationResult> {
    let mut generator = create_strategy(config.clone());
    let report = run_backtest(generator.as_mut(), candles, options)?;
    Ok(report.into_result(config.clone()))
}

fn log_trade_table(report: &BacktestReport) {
    info!("=== Trade details ===");
    info!(
        "{:<20} | {:<20} | {:>10} | {:>10} | {:>10} | {:<6}",
        "Entry", "Exit", "Entry px", "Exit px", "PnL", "Status"
    );
    for trade in &report.closed_trades {
        let status = match (trade.forced, trade.is_win()) {
            (true, true) => "WIN*",
            (true, false) => "LOSS*",
            (false, true) => "WIN",
            (false, false) => "LOSS",
        };
        info!(
            "{:<20} | {:<20} | {:>10.2} | {:>10.2} | {:>10.2} | {:<6}",
            trade.entry_time.format("%Y-%m-%d %H:%M:%S"),
            trade.exit_time.format("%Y-%m-%d %H:%M:%S"),
            trade.entry_price,
            trade.exit_price,
            trade.pnl,
            status
        );
    }
    for position in &report.open_positions {
        info!(
            "{:<20} | {:<20} | {:>10.2} | {:>10} | {:>10} | OPEN",
            position.entry_time.format("%Y-%m-%d %H:%M:%S"),
            "-",
            position.entry_price,
            "-",
            "-"
        );
    }

    info!("=== Summary ===");
    info!("Trades: {}", report.trades);
    info!(
        "Winning: {} ({:.1}%)",
        report.wins,
        report.win_rate_percent()
    );
    info!("Profit: {:.2}", report.profit);
    info!("Max drawdown: {:.2}", report.max_drawdown);
}
