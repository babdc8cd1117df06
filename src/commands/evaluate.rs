use crate::backtester::run_backtest;
use crate::context::AppContext;
use crate::performance::PerformanceCalculator;
use crate::strategy::{create_strategy, StrategyKind};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

pub struct EvaluateArgs<'a> {
    pub data: &'a Path,
    pub symbol: Option<&'a str>,
    pub close_all_at_end: bool,
    pub verbose: bool,
}

pub fn run(app: &AppContext, kind: StrategyKind, args: EvaluateArgs<'_>) -> Result<()> {
    info!("Received evaluate command for template_id={}", kind.template_id());
    let candles = app.load_candles(args.data, args.symbol)?;
    let config = app.load_config(kind)?;
    let options = app.backtest_options(args.close_all_at_end, args.verbose);

    let mut generator = create_strategy(config.clone());
    let report = run_backtest(generator.as_mut(), &candles, options)
        .with_context(|| format!("Backtest failed for {}", candles.symbol))?;
    let performance = PerformanceCalculator::calculate_performance(&report);
    let open_positions = report.open_positions.len();

    println!("{}", report.into_result(config));
    println!(
        "Average trade: {:.2} | Median: {:.2} | Std dev: {:.2}",
        performance.avg_trade_pnl, performance.median_trade_pnl, performance.trade_pnl_std_dev
    );
    println!(
        "Best trade: {:.2} | Worst trade: {:.2} | Forced closes: {}",
        performance.best_trade, performance.worst_trade, performance.forced_closes
    );
    if open_positions > 0 {
        println!("Open positions at end: {}", open_positions);
    }
    Ok(())
}
