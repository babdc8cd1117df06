use crate::backtester::BacktestReport;
use crate::models::{ClosedTrade, StrategyPerformance};
use statrs::statistics::Statistics;
use std::cmp::Ordering;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_performance(report: &BacktestReport) -> StrategyPerformance {
        Self::from_trades(&report.closed_trades, report.max_drawdown)
    }

    pub fn from_trades(trades: &[ClosedTrade], max_drawdown: f64) -> StrategyPerformance {
        let trade_pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
        let total_trades = trade_pnls.len();
        let winning_trades = trade_pnls.iter().filter(|pnl| **pnl > 0.0).count();
        let losing_trades = total_trades - winning_trades;
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let best_trade = trade_pnls
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let worst_trade = trade_pnls.iter().copied().fold(f64::INFINITY, f64::min);

        StrategyPerformance {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_profit: trade_pnls.iter().sum(),
            max_drawdown,
            avg_trade_pnl: Self::average(&trade_pnls),
            median_trade_pnl: Self::median(&trade_pnls),
            trade_pnl_std_dev: Self::std_dev(&trade_pnls),
            best_trade: if best_trade.is_finite() { best_trade } else { 0.0 },
            worst_trade: if worst_trade.is_finite() { worst_trade } else { 0.0 },
            forced_closes: trades.iter().filter(|t| t.forced).count(),
        }
    }

    fn average(values: &[f64]) -> f64 {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            0.0
        } else {
            finite.iter().mean()
        }
    }

    fn median(values: &[f64]) -> f64 {
        let mut filtered: Vec<f64> = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect();

        if filtered.is_empty() {
            return 0.0;
        }

        filtered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = filtered.len() / 2;

        if filtered.len() % 2 == 0 {
            (filtered[mid - 1] + filtered[mid]) / 2.0
        } else {
            filtered[mid]
        }
    }

    /// Sample standard deviation; 0 below two observations.
    fn std_dev(values: &[f64]) -> f64 {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.len() < 2 {
            return 0.0;
        }
        let std_dev = finite.iter().std_dev();
        if std_dev.is_finite() {
            std_dev
        } else {
            0.0
        }
    }
}
