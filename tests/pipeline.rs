use chrono::{DateTime, Duration, TimeZone, Utc};
use signal_engine::backtester::{evaluate, run_backtest, BacktestOptions, BacktestReport};
use signal_engine::commands::{config, evaluate as evaluate_command, optimize, signals};
use signal_engine::config::{ConfigSource, RuntimeSettings};
use signal_engine::context::AppContext;
use signal_engine::models::{Candle, CandleSeries, ParameterRange};
use signal_engine::optimizer::{GridSearch, OptimizerOptions, ParameterSpace};
use signal_engine::performance::PerformanceCalculator;
use signal_engine::strategy::{
    create_strategy, CooldownPolicy, RsiConfig, SignalGenerator, SniperConfig, StrategyConfig,
    StrategyKind,
};
use std::fs;
use std::path::Path;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 2, 9, 30, 0).unwrap()
}

fn build_candles(count: usize, close_at: impl Fn(usize) -> f64, spread: f64) -> CandleSeries {
    let mut series = CandleSeries::new("TEST");
    for i in 0..count {
        let close = close_at(i);
        series.push(&Candle {
            date: start_time() + Duration::hours(i as i64),
            open: close,
            high: close + spread,
            low: close - spread,
            close,
            volume: 1_000.0 + 500.0 * (i as f64 / 7.0).sin().abs(),
        });
    }
    series
}

fn wave_close(i: usize) -> f64 {
    let t = i as f64;
    100.0 + 10.0 * (t / 15.0).sin() + 4.0 * (t / 4.3).sin() + 0.01 * t
}

fn wave(count: usize) -> CandleSeries {
    build_candles(count, wave_close, 1.0)
}

fn wave_rsi() -> StrategyConfig {
    StrategyConfig::Rsi(RsiConfig {
        rsi_length: 5,
        ema_fast_length: 3,
        ema_slow_length: 10,
        rsi_buy_level: 50.0,
        rsi_exit_level: 55.0,
        min_bars_between_trades: 3,
        count_sell_signals: 2,
        cooldown_policy: CooldownPolicy::Separate,
    })
}

fn wave_sniper() -> StrategyConfig {
    StrategyConfig::Sniper(SniperConfig {
        rsi_length: 7,
        ema_fast_length: 5,
        ema_slow_length: 20,
        atr_length: 7,
        atr_sma_length: 7,
        volume_sma_length: 10,
        rsi_mfi_buy_level: 52.0,
        rsi_mfi_exit_level: 48.0,
        ema_min_delta: 0.0001,
        atr_multiplier: 0.5,
        buy_volume_factor: 1.0,
        sell_volume_factor: 0.8,
        deduplicate_signals: false,
    })
}

fn backtest(
    config: &StrategyConfig,
    candles: &CandleSeries,
    close_all_at_end: bool,
) -> BacktestReport {
    let mut generator = create_strategy(config.clone());
    run_backtest(
        generator.as_mut(),
        candles,
        BacktestOptions {
            close_all_at_end,
            verbose: false,
        },
    )
    .unwrap()
}

fn assert_equity_conserved(report: &BacktestReport, candles: &CandleSeries) {
    let last_close = *candles.close.last().unwrap();
    let unrealized: f64 = report
        .open_positions
        .iter()
        .map(|position| last_close - position.entry_price)
        .sum();
    let last_equity = *report.equity_curve.last().unwrap();
    assert!((last_equity - (report.profit + unrealized)).abs() < 1e-9);
    let realized: f64 = report.closed_trades.iter().map(|trade| trade.pnl).sum();
    assert!((realized - report.profit).abs() < 1e-9);
}

#[test]
fn repeated_runs_are_identical() {
    let _ = env_logger::builder().is_test(true).try_init();
    let candles = wave(600);
    for config in [wave_rsi(), wave_sniper()] {
        let first = evaluate(&config, &candles, BacktestOptions::default()).unwrap();
        let second = evaluate(&config, &candles, BacktestOptions::default()).unwrap();
        assert_eq!(first, second);

        let mut generator = create_strategy(config.clone());
        generator.execute(&candles);
        let buys = generator.buy_points().to_vec();
        generator.execute(&candles);
        assert_eq!(generator.buy_points(), buys.as_slice());
    }
}

#[test]
fn steady_ramp_never_churns() {
    let candles = build_candles(300, |i| 100.0 + 100.0 * i as f64 / 299.0, 1.0);
    for kind in [StrategyKind::Rsi, StrategyKind::Sniper] {
        let mut generator = create_strategy(StrategyConfig::default_for(kind));
        generator.execute(&candles);
        assert!(generator.buy_points().len() <= 1, "{} bought repeatedly", kind);
        assert!(generator.sell_points().is_empty(), "{} sold on a ramp", kind);
    }
}

#[test]
fn flat_prices_produce_no_signals() {
    let candles = build_candles(300, |_| 100.0, 0.5);
    for kind in [StrategyKind::Rsi, StrategyKind::Sniper] {
        let mut generator = create_strategy(StrategyConfig::default_for(kind));
        let last_bar = generator.execute(&candles);
        assert!(generator.signals().is_empty(), "{} fired on flat data", kind);
        assert!(!last_bar.buy && !last_bar.sell);
    }
}

#[test]
fn short_series_is_gated() {
    for config in [
        StrategyConfig::default_for(StrategyKind::Rsi),
        StrategyConfig::default_for(StrategyKind::Sniper),
        wave_rsi(),
        wave_sniper(),
    ] {
        let mut generator = create_strategy(config.clone());
        let candles = wave(generator.min_data_points() - 1);
        let last_bar = generator.execute(&candles);
        assert!(generator.signals().is_empty(), "{} ran during warm-up", config);
        assert!(!last_bar.buy && !last_bar.sell);

        let report = backtest(&config, &candles, true);
        assert_eq!(report.trades, 0);
        assert!(report.equity_curve.iter().all(|equity| *equity == 0.0));
    }
}

#[test]
fn wave_backtests_trade_and_conserve_equity() {
    let candles = wave(1000);

    let rsi = backtest(&wave_rsi(), &candles, false);
    assert_eq!(rsi.buy_count, 5);
    assert_eq!(rsi.trades, 5);
    assert_eq!(rsi.wins, 5);
    assert!(rsi.open_positions.is_empty());
    assert_equity_conserved(&rsi, &candles);

    let sniper = backtest(&wave_sniper(), &candles, false);
    assert_eq!(sniper.buy_count, 8);
    assert_eq!(sniper.sell_count, 11);
    assert_eq!(sniper.trades, 8);
    assert_eq!(sniper.wins, 6);
    assert_equity_conserved(&sniper, &candles);

    for report in [&rsi, &sniper] {
        assert!(report.max_drawdown >= 0.0);
        assert!((0.0..=1.0).contains(&report.win_rate));
        assert_eq!(report.equity_curve.len(), candles.len());
        let performance = PerformanceCalculator::calculate_performance(report);
        assert_eq!(performance.total_trades, report.trades);
        assert!((performance.total_profit - report.profit).abs() < 1e-9);
    }
}

#[test]
fn close_all_at_end_adds_one_trade_per_open_position() {
    // Each cut lands just after a buy, leaving positions open at the last bar.
    for (config, bars, open) in [(wave_rsi(), 940, 1), (wave_sniper(), 781, 2)] {
        let candles = wave(bars);
        let held = backtest(&config, &candles, false);
        let closed = backtest(&config, &candles, true);

        assert_eq!(held.open_positions.len(), open);
        assert!(closed.open_positions.is_empty());
        assert_eq!(closed.trades - held.trades, held.open_positions.len());
        assert_eq!(
            closed.closed_trades.iter().filter(|trade| trade.forced).count(),
            open
        );
        assert_equity_conserved(&held, &candles);
        assert_equity_conserved(&closed, &candles);
        assert_eq!(closed.equity_curve.last().copied(), Some(closed.profit));
        assert!((closed.profit - held.equity_curve.last().unwrap()).abs() < 1e-9);
    }
}

#[test]
fn optimizer_agrees_with_exhaustive_replay() {
    let candles = wave(500);
    let base = wave_sniper();
    let space = ParameterSpace::new()
        .with_axis("rsiMfiBuyLevel", ParameterRange::new(50.0, 54.0, 2.0))
        .with_axis("rsiMfiExitLevel", ParameterRange::new(46.0, 50.0, 2.0))
        .with_axis("atrMultiplier", ParameterRange::new(0.3, 0.7, 0.2));
    let options = OptimizerOptions {
        parallel: true,
        ..OptimizerOptions::default()
    };

    let outcome = GridSearch::new(&candles, &base).run(&space, &options).unwrap();
    assert_eq!(outcome.total, 27);
    assert!(outcome.complete);

    let grid = space.grid().unwrap();
    let mut best: Option<(usize, f64)> = None;
    for (index, parameters) in grid.iter().enumerate() {
        let result =
            evaluate(&base.with_parameters(&parameters), &candles, BacktestOptions::default())
                .unwrap();
        if best.map_or(true, |(_, profit)| result.profit > profit) {
            best = Some((index, result.profit));
        }
    }
    let (best_index, best_profit) = best.unwrap();
    assert_eq!(outcome.best_index, best_index);
    assert_eq!(outcome.best.profit, best_profit);
}

#[test]
fn applied_config_replaces_generator_state() {
    let candles = wave(400);
    let mut generator = create_strategy(StrategyConfig::default_for(StrategyKind::Sniper));
    generator.execute(&candles);

    generator.set_config(wave_sniper()).unwrap();
    assert_eq!(generator.config(), wave_sniper());
    generator.execute(&candles);

    let mut fresh = create_strategy(wave_sniper());
    fresh.execute(&candles);
    assert_eq!(generator.signals(), fresh.signals());
    assert!(generator.set_config(wave_rsi()).is_err());
}

fn write_quotes(dir: &Path, candles: &CandleSeries) -> std::path::PathBuf {
    let path = dir.join("TEST.json");
    fs::write(&path, serde_json::to_string(candles).unwrap()).unwrap();
    path
}

#[test]
fn commands_run_against_files() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let data = write_quotes(dir.path(), &wave(250));
    let app = AppContext::with_settings(RuntimeSettings {
        config_dir: dir.path().join("config"),
        ..RuntimeSettings::default()
    });

    assert!(signals::run(&app, StrategyKind::Rsi, &data, None).is_err());
    config::run(&app, StrategyKind::Rsi, false, true).unwrap();
    config::run(&app, StrategyKind::Rsi, true, false).unwrap();

    signals::run(&app, StrategyKind::Rsi, &data, Some("test")).unwrap();
    evaluate_command::run(
        &app,
        StrategyKind::Rsi,
        evaluate_command::EvaluateArgs {
            data: &data,
            symbol: None,
            close_all_at_end: true,
            verbose: true,
        },
    )
    .unwrap();

    let source = app.config_source(StrategyKind::Rsi);
    assert!(!source.primary().exists());
    optimize::run(
        &app,
        StrategyKind::Rsi,
        optimize::OptimizeArgs {
            data: &data,
            symbol: None,
            sequential: true,
            time_budget_secs: Some(0.5),
            apply: true,
        },
    )
    .unwrap();

    let applied: RsiConfig = source.load().unwrap();
    let defaults: RsiConfig = source.load_default().unwrap();
    assert_eq!(defaults, RsiConfig::default());
    assert_eq!(applied.ema_fast_length, defaults.ema_fast_length);
    assert_eq!(
        app.load_config(StrategyKind::Rsi).unwrap(),
        StrategyConfig::Rsi(applied)
    );
}
