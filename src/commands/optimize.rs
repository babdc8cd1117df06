use crate::context::AppContext;
use crate::optimizer::GridSearch;
use crate::strategy::{create_strategy, StrategyConfig, StrategyKind};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

pub struct OptimizeArgs<'a> {
    pub data: &'a Path,
    pub symbol: Option<&'a str>,
    pub sequential: bool,
    pub time_budget_secs: Option<f64>,
    pub apply: bool,
}

pub fn run(app: &AppContext, kind: StrategyKind, args: OptimizeArgs<'_>) -> Result<()> {
    info!(
        "Received optimize command for template_id={} (default parameter space)",
        kind.template_id()
    );
    let candles = app.load_candles(args.data, args.symbol)?;
    let base = app.load_config(kind)?;
    let space = StrategyConfig::default_parameter_space(kind);
    let options = app.optimizer_options(args.sequential, args.time_budget_secs)?;

    let search = GridSearch::new(&candles, &base);
    let outcome = search
        .run(&space, &options)
        .with_context(|| format!("Optimization failed for {}", candles.symbol))?;
    let snapshot = search.status().snapshot();
    info!(
        "{}: {}/{} candidates evaluated",
        snapshot.phase, snapshot.completed_candidates, snapshot.total_candidates
    );

    println!("{}", outcome.best);
    if !outcome.complete {
        println!(
            "Time budget reached: {}/{} candidates evaluated",
            outcome.evaluated, outcome.total
        );
    }

    if args.apply {
        let source = app.config_source(kind);
        outcome
            .best
            .config
            .save(&source)
            .with_context(|| format!("Failed to persist optimized {} config", kind))?;
        info!("Saved optimized config to {}", source.primary().display());

        let mut generator = create_strategy(base.clone());
        generator.set_config(outcome.best.config.clone())?;
        let last_bar = generator.execute(&candles);
        println!(
            "Applied config to {}: {} buy / {} sell, last bar buy={} sell={}",
            generator.template_id(),
            generator.buy_points().len(),
            generator.sell_points().len(),
            last_bar.buy,
            last_bar.sell
        );
    }
    Ok(())
}
