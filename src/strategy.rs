use crate::config::ConfigSource;
use crate::error::{EngineError, EngineResult};
use crate::indicators::IndicatorSeries;
use crate::models::{CandleSeries, ParameterRange};
use crate::optimizer::ParameterSpace;
use crate::signals::{LastBarSignals, SignalPoint, SignalSet};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// A stateful generator turning a candle series into buy/sell events.
///
/// Every execution clears the previous signal lists and recomputes them from
/// scratch. Instances are not meant to be shared between concurrent
/// evaluations; each worker builds its own through [`create_strategy`].
pub trait SignalGenerator: Send {
    fn template_id(&self) -> &'static str;

    /// Smallest series length the generator will evaluate.
    fn min_data_points(&self) -> usize;

    /// Runs the generator over the whole series and reports whether a signal
    /// fired on the final bar.
    fn try_execute(&mut self, candles: &CandleSeries) -> EngineResult<LastBarSignals>;

    /// Like [`SignalGenerator::try_execute`], but treats insufficient or
    /// malformed input as "no signals".
    fn execute(&mut self, candles: &CandleSeries) -> LastBarSignals {
        match self.try_execute(candles) {
            Ok(last_bar) => last_bar,
            Err(error) => {
                warn!("[{}] no signals produced: {}", self.template_id(), error);
                LastBarSignals::default()
            }
        }
    }

    fn signals(&self) -> &SignalSet;

    fn buy_points(&self) -> &[SignalPoint] {
        &self.signals().buys
    }

    fn sell_points(&self) -> &[SignalPoint] {
        &self.signals().sells
    }

    fn config(&self) -> StrategyConfig;

    /// Replaces the active config wholesale. Signals from the previous config are discarded.
    fn set_config(&mut self, config: StrategyConfig) -> EngineResult<()>;

    /// Indicator series from the most recent execution, if it got that far.
    fn indicators(&self) -> Option<&IndicatorSeries>;
}

#[path = "strategies/rsi.rs"]
pub mod rsi;

pub use rsi::{CooldownPolicy, RsiConfig, RsiStrategy};

#[path = "strategies/sniper.rs"]
pub mod sniper;

pub use sniper::{SniperConfig, SniperStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Rsi,
    Sniper,
}

impl StrategyKind {
    pub fn template_id(&self) -> &'static str {
        match self {
            StrategyKind::Rsi => "rsi",
            StrategyKind::Sniper => "sniper",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_id())
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rsi" => Ok(StrategyKind::Rsi),
            "sniper" | "trend_sniper" => Ok(StrategyKind::Sniper),
            other => Err(EngineError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Parameters of one strategy variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum StrategyConfig {
    Rsi(RsiConfig),
    Sniper(SniperConfig),
}

impl StrategyConfig {
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Rsi => StrategyConfig::Rsi(RsiConfig::default()),
            StrategyKind::Sniper => StrategyConfig::Sniper(SniperConfig::default()),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Rsi(_) => StrategyKind::Rsi,
            StrategyConfig::Sniper(_) => StrategyKind::Sniper,
        }
    }

    /// Numeric view of every field, keyed by its persisted name.
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        match self {
            StrategyConfig::Rsi(config) => config.to_parameters(),
            StrategyConfig::Sniper(config) => config.to_parameters(),
        }
    }

    /// A fresh config with `overrides` applied on top of this one. Unknown keys are ignored.
    pub fn with_parameters(&self, overrides: &HashMap<String, f64>) -> Self {
        match self {
            StrategyConfig::Rsi(config) => StrategyConfig::Rsi(config.with_parameters(overrides)),
            StrategyConfig::Sniper(config) => {
                StrategyConfig::Sniper(config.with_parameters(overrides))
            }
        }
    }

    /// Grid searched by the optimizer when the caller does not supply one.
    pub fn default_parameter_space(kind: StrategyKind) -> ParameterSpace {
        let axes: &[(&str, f64, f64, f64)] = match kind {
            StrategyKind::Rsi => &[
                ("rsiLength", 7.0, 21.0, 2.0),
                ("emaSlowLength", 30.0, 200.0, 10.0),
                ("rsiBuyLevel", 20.0, 40.0, 2.0),
                ("rsiExitLevel", 60.0, 80.0, 2.0),
            ],
            StrategyKind::Sniper => &[
                ("rsiMfiBuyLevel", 30.0, 45.0, 1.0),
                ("rsiMfiExitLevel", 45.0, 60.0, 1.0),
                ("emaFastLength", 5.0, 15.0, 1.0),
                ("atrMultiplier", 0.3, 1.0, 0.1),
            ],
        };
        let mut space = ParameterSpace::new();
        for (name, min, max, step) in axes {
            space = space.with_axis(*name, ParameterRange::new(*min, *max, *step));
        }
        space
    }

    /// Loads the persisted config for `kind`, falling back to the source's default document.
    pub fn load<S: ConfigSource>(kind: StrategyKind, source: &S) -> EngineResult<Self> {
        Ok(match kind {
            StrategyKind::Rsi => StrategyConfig::Rsi(source.load()?),
            StrategyKind::Sniper => StrategyConfig::Sniper(source.load()?),
        })
    }

    /// Loads only the default document for `kind`.
    pub fn load_default<S: ConfigSource>(kind: StrategyKind, source: &S) -> EngineResult<Self> {
        Ok(match kind {
            StrategyKind::Rsi => StrategyConfig::Rsi(source.load_default()?),
            StrategyKind::Sniper => StrategyConfig::Sniper(source.load_default()?),
        })
    }

    /// Persists the variant's fields as a flat document, matching what [`StrategyConfig::load`] reads.
    pub fn save<S: ConfigSource>(&self, source: &S) -> EngineResult<()> {
        match self {
            StrategyConfig::Rsi(config) => source.save(config),
            StrategyConfig::Sniper(config) => source.save(config),
        }
    }

    pub fn save_default<S: ConfigSource>(&self, source: &S) -> EngineResult<()> {
        match self {
            StrategyConfig::Rsi(config) => source.save_default(config),
            StrategyConfig::Sniper(config) => source.save_default(config),
        }
    }
}

impl fmt::Display for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .parameters()
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{} {{{}}}", self.kind(), rendered.join(", "))
    }
}

pub fn create_strategy(config: StrategyConfig) -> Box<dyn SignalGenerator + Send + Sync> {
    match config {
        StrategyConfig::Rsi(config) => Box::new(RsiStrategy::new(config)),
        StrategyConfig::Sniper(config) => Box::new(SniperStrategy::new(config)),
    }
}
