use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use signal_engine::{
    commands::{
        config,
        evaluate::{self, EvaluateArgs},
        optimize::{self, OptimizeArgs},
        signals,
    },
    context::AppContext,
    strategy::StrategyKind,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "signal-engine")]
#[command(about = "Indicator signals, backtests and parameter search for trading strategies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate buy/sell signals with the active config
    Signals {
        #[arg(value_enum)]
        strategy: StrategyKind,
        /// Candle JSON file, or a directory of <SYMBOL>.json files
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        /// Symbol to load (defaults to the data file name)
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Backtest the active config and report performance
    Evaluate {
        #[arg(value_enum)]
        strategy: StrategyKind,
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Liquidate positions still open at the last bar
        #[arg(long)]
        close_all_at_end: bool,
        /// Log every trade
        #[arg(long)]
        verbose: bool,
    },
    /// Grid-search the default parameter space for the most profitable config
    Optimize {
        #[arg(value_enum)]
        strategy: StrategyKind,
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Evaluate candidates on a single thread
        #[arg(long)]
        sequential: bool,
        /// Stop starting new candidates after this many seconds
        #[arg(long, value_name = "SECS")]
        time_budget: Option<f64>,
        /// Save the winning config as the active config
        #[arg(long)]
        apply: bool,
    },
    /// Show the active config
    Config {
        #[arg(value_enum)]
        strategy: StrategyKind,
        /// Show the default document instead of the active one
        #[arg(long)]
        defaults: bool,
        /// Write built-in defaults to the default document first
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = AppContext::initialize()?;
    info!(
        "Starting signal engine (config dir {}). Not financial advice.",
        app.settings().config_dir.display()
    );

    match cli.command {
        Commands::Signals {
            strategy,
            data,
            symbol,
        } => signals::run(&app, strategy, &data, symbol.as_deref())?,
        Commands::Evaluate {
            strategy,
            data,
            symbol,
            close_all_at_end,
            verbose,
        } => evaluate::run(
            &app,
            strategy,
            EvaluateArgs {
                data: &data,
                symbol: symbol.as_deref(),
                close_all_at_end,
                verbose,
            },
        )?,
        Commands::Optimize {
            strategy,
            data,
            symbol,
            sequential,
            time_budget,
            apply,
        } => optimize::run(
            &app,
            strategy,
            OptimizeArgs {
                data: &data,
                symbol: symbol.as_deref(),
                sequential,
                time_budget_secs: time_budget,
                apply,
            },
        )?,
        Commands::Config {
            strategy,
            defaults,
            init,
        } => config::run(&app, strategy, defaults, init)?,
    }

    Ok(())
}
