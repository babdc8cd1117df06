use crate::backtester::BacktestOptions;
use crate::config::{budget_duration, FileConfigSource, RuntimeSettings};
use crate::feeder::{JsonFileFeeder, QuoteFeeder};
use crate::models::CandleSeries;
use crate::optimizer::OptimizerOptions;
use crate::strategy::{StrategyConfig, StrategyKind};
use anyhow::{anyhow, Context, Result};
use log::info;
use std::path::Path;

#[derive(Clone, Debug)]
pub struct AppContext {
    settings: RuntimeSettings,
}

impl AppContext {
    pub fn initialize() -> Result<Self> {
        let settings = RuntimeSettings::from_env().context("Invalid runtime settings")?;
        Ok(Self::with_settings(settings))
    }

    pub fn with_settings(settings: RuntimeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// `<config_dir>/<template>.json`, backed by `<config_dir>/<template>.default.json`.
    pub fn config_source(&self, kind: StrategyKind) -> FileConfigSource {
        let dir = &self.settings.config_dir;
        FileConfigSource::new(
            dir.join(format!("{}.json", kind.template_id())),
            dir.join(format!("{}.default.json", kind.template_id())),
        )
    }

    pub fn load_config(&self, kind: StrategyKind) -> Result<StrategyConfig> {
        let source = self.config_source(kind);
        let config = StrategyConfig::load(kind, &source).with_context(|| {
            format!(
                "No usable config for {} (run `config {} --init` to seed defaults)",
                kind,
                kind.template_id()
            )
        })?;
        info!("Active config: {}", config);
        Ok(config)
    }

    pub fn feeder<P: AsRef<Path>>(&self, data: P) -> JsonFileFeeder {
        JsonFileFeeder::new(data.as_ref())
    }

    /// Loads candles for `symbol`, defaulting to the data file's stem.
    pub fn load_candles<P: AsRef<Path>>(
        &self,
        data: P,
        symbol: Option<&str>,
    ) -> Result<CandleSeries> {
        let data = data.as_ref();
        let symbol = match symbol {
            Some(symbol) => symbol.to_string(),
            None => data
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string(),
        };
        self.feeder(data).get_quote(&symbol)
    }

    pub fn backtest_options(&self, close_all_at_end: bool, verbose: bool) -> BacktestOptions {
        BacktestOptions {
            close_all_at_end: close_all_at_end || self.settings.backtest_close_all_at_end,
            verbose,
        }
    }

    /// A `--time-budget` flag overrides the configured budget; it must be a positive,
    /// representable number of seconds.
    pub fn optimizer_options(
        &self,
        sequential: bool,
        time_budget_secs: Option<f64>,
    ) -> Result<OptimizerOptions> {
        let time_budget = match time_budget_secs {
            Some(secs) if !(secs.is_finite() && secs > 0.0) => {
                return Err(anyhow!("--time-budget must be > 0 (value: {})", secs));
            }
            Some(secs) => Some(budget_duration("--time-budget", secs)?),
            None => self.settings.optimizer_time_budget,
        };
        Ok(OptimizerOptions {
            parallel: self.settings.optimizer_parallel && !sequential,
            time_budget,
            backtest: self.backtest_options(false, false),
            show_progress: true,
        })
    }
}
