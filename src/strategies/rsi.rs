use crate::error::{EngineError, EngineResult};
use crate::indicators::{IndicatorKind, IndicatorSeries, IndicatorWindows};
use crate::models::CandleSeries;
use crate::param_utils::{
    bool_param, get_param_bool, get_param_f64, get_param_usize, get_usize_param_min,
};
use crate::signals::{LastBarSignals, SignalAction, SignalSet};
use crate::strategy::{SignalGenerator, StrategyConfig};
use crate::strategy_utils::{cooldown_elapsed, crosses_above, crosses_below, finite_pair};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const WARM_UP_MARGIN: usize = 10;

/// How the minimum spacing between signals is tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownPolicy {
    /// Buys are spaced from the last buy and sells from the last sell.
    #[default]
    Separate,
    /// Any signal restarts the cooldown for both sides.
    Shared,
}

impl CooldownPolicy {
    fn from_shared(shared: bool) -> Self {
        if shared {
            CooldownPolicy::Shared
        } else {
            CooldownPolicy::Separate
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RsiConfig {
    pub rsi_length: usize,
    pub ema_fast_length: usize,
    pub ema_slow_length: usize,
    pub rsi_buy_level: f64,
    pub rsi_exit_level: f64,
    pub min_bars_between_trades: usize,
    /// Sell fires when at least this many of the four sell conditions hold.
    pub count_sell_signals: usize,
    pub cooldown_policy: CooldownPolicy,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            rsi_length: 14,
            ema_fast_length: 20,
            ema_slow_length: 50,
            rsi_buy_level: 30.0,
            rsi_exit_level: 70.0,
            min_bars_between_trades: 5,
            count_sell_signals: 2,
            cooldown_policy: CooldownPolicy::Separate,
        }
    }
}

impl RsiConfig {
    pub fn to_parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("rsiLength".to_string(), self.rsi_length as f64),
            ("emaFastLength".to_string(), self.ema_fast_length as f64),
            ("emaSlowLength".to_string(), self.ema_slow_length as f64),
            ("rsiBuyLevel".to_string(), self.rsi_buy_level),
            ("rsiExitLevel".to_string(), self.rsi_exit_level),
            (
                "minBarsBetweenTrades".to_string(),
                self.min_bars_between_trades as f64,
            ),
            ("countSellSignals".to_string(), self.count_sell_signals as f64),
            (
                "cooldownPolicy".to_string(),
                bool_param(self.cooldown_policy == CooldownPolicy::Shared),
            ),
        ])
    }

    pub fn with_parameters(&self, parameters: &HashMap<String, f64>) -> Self {
        Self {
            rsi_length: get_usize_param_min(parameters, "rsiLength", self.rsi_length, 1),
            ema_fast_length: get_usize_param_min(
                parameters,
                "emaFastLength",
                self.ema_fast_length,
                1,
            ),
            ema_slow_length: get_usize_param_min(
                parameters,
                "emaSlowLength",
                self.ema_slow_length,
                1,
            ),
            rsi_buy_level: get_param_f64(parameters, "rsiBuyLevel", self.rsi_buy_level),
            rsi_exit_level: get_param_f64(parameters, "rsiExitLevel", self.rsi_exit_level),
            min_bars_between_trades: get_param_usize(
                parameters,
                "minBarsBetweenTrades",
                self.min_bars_between_trades,
            ),
            count_sell_signals: get_param_usize(
                parameters,
                "countSellSignals",
                self.count_sell_signals,
            ),
            cooldown_policy: CooldownPolicy::from_shared(get_param_bool(
                parameters,
                "cooldownPolicy",
                self.cooldown_policy == CooldownPolicy::Shared,
            )),
        }
    }

    fn windows(&self) -> IndicatorWindows {
        IndicatorWindows {
            rsi: Some(self.rsi_length),
            ema_fast: Some(self.ema_fast_length),
            ema_slow: Some(self.ema_slow_length),
            ..Default::default()
        }
    }

    fn longest_window(&self) -> usize {
        self.rsi_length
            .max(self.ema_slow_length)
            .max(self.ema_fast_length)
    }
}

/// Cooldown bookkeeping for one execution.
#[derive(Debug, Default)]
struct Cooldowns {
    last_buy: Option<usize>,
    last_sell: Option<usize>,
    last_any: Option<usize>,
}

impl Cooldowns {
    fn for_buy(&self, policy: CooldownPolicy) -> Option<usize> {
        match policy {
            CooldownPolicy::Separate => self.last_buy,
            CooldownPolicy::Shared => self.last_any,
        }
    }

    fn for_sell(&self, policy: CooldownPolicy) -> Option<usize> {
        match policy {
            CooldownPolicy::Separate => self.last_sell,
            CooldownPolicy::Shared => self.last_any,
        }
    }
}

pub struct RsiStrategy {
    config: RsiConfig,
    signals: SignalSet,
    indicators: Option<IndicatorSeries>,
}

impl RsiStrategy {
    pub fn new(config: RsiConfig) -> Self {
        Self {
            config,
            signals: SignalSet::default(),
            indicators: None,
        }
    }

    pub fn rsi_config(&self) -> &RsiConfig {
        &self.config
    }

    /// RSI at the final bar of the last execution.
    pub fn last_rsi(&self) -> Option<f64> {
        self.indicators
            .as_ref()
            .and_then(|series| series.last(IndicatorKind::Rsi))
    }

    /// Slow EMA at the final bar of the last execution.
    pub fn last_ema(&self) -> Option<f64> {
        self.indicators
            .as_ref()
            .and_then(|series| series.last(IndicatorKind::EmaSlow))
    }
}

impl SignalGenerator for RsiStrategy {
    fn template_id(&self) -> &'static str {
        "rsi"
    }

    fn min_data_points(&self) -> usize {
        self.config.longest_window() + WARM_UP_MARGIN
    }

    fn try_execute(&mut self, candles: &CandleSeries) -> EngineResult<LastBarSignals> {
        self.signals.clear();
        self.indicators = None;

        candles.validate_lengths()?;
        let n = candles.len();
        let need = self.min_data_points();
        if n < need {
            return Err(EngineError::InsufficientData {
                strategy: self.template_id().to_string(),
                have: n,
                need,
            });
        }

        let indicators = IndicatorSeries::compute(candles, &self.config.windows())?;
        let rsi = indicators.require(IndicatorKind::Rsi)?;
        let ema_fast = indicators.require(IndicatorKind::EmaFast)?;
        let ema_slow = indicators.require(IndicatorKind::EmaSlow)?;

        let cfg = &self.config;
        let mut cooldowns = Cooldowns::default();
        let mut last_bar = LastBarSignals::default();

        for i in self.config.longest_window().max(1)..n {
            let series = [candles.close.as_slice(), rsi, ema_fast, ema_slow];
            let Some(pairs) = finite_pair(&series, i) else {
                continue;
            };
            let &[(prev_close, close), (prev_rsi, curr_rsi), (_, fast), (prev_slow, slow)] =
                pairs.as_slice()
            else {
                continue;
            };

            let buy_cooldown = cooldown_elapsed(
                i,
                cooldowns.for_buy(cfg.cooldown_policy),
                cfg.min_bars_between_trades,
            );
            let sell_cooldown = cooldown_elapsed(
                i,
                cooldowns.for_sell(cfg.cooldown_policy),
                cfg.min_bars_between_trades,
            );

            let buy = crosses_above(prev_close, close, prev_slow, slow)
                && crosses_above(prev_rsi, curr_rsi, cfg.rsi_buy_level, cfg.rsi_buy_level)
                && fast > slow
                && buy_cooldown;

            let sell_votes = [
                crosses_below(prev_close, close, prev_slow, slow),
                crosses_below(prev_rsi, curr_rsi, cfg.rsi_exit_level, cfg.rsi_exit_level),
                sell_cooldown,
                fast < slow,
            ]
            .iter()
            .filter(|held| **held)
            .count();
            let sell = sell_votes >= cfg.count_sell_signals;

            let date = candles.date[i];
            if buy {
                debug!(
                    "[rsi] BUY {} close={:.2} rsi={:.1} ema={:.2} fast={:.2}",
                    date, close, curr_rsi, slow, fast
                );
                self.signals.record(SignalAction::Buy, date, close);
                cooldowns.last_buy = Some(i);
                cooldowns.last_any = Some(i);
                last_bar.buy |= i == n - 1;
            }
            if sell {
                debug!(
                    "[rsi] SELL {} close={:.2} rsi={:.1} ema={:.2} votes={}",
                    date, close, curr_rsi, slow, sell_votes
                );
                self.signals.record(SignalAction::Sell, date, close);
                cooldowns.last_sell = Some(i);
                cooldowns.last_any = Some(i);
                last_bar.sell |= i == n - 1;
            }
        }

        self.indicators = Some(indicators);
        Ok(last_bar)
    }

    fn signals(&self) -> &SignalSet {
        &self.signals
    }

    fn config(&self) -> StrategyConfig {
        StrategyConfig::Rsi(self.config.clone())
    }

    fn set_config(&mut self, config: StrategyConfig) -> EngineResult<()> {
        match config {
            StrategyConfig::Rsi(config) => {
                self.config = config;
                self.signals.clear();
                self.indicators = None;
                Ok(())
            }
            other => Err(EngineError::ConfigMismatch {
                expected: self.template_id().to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    fn indicators(&self) -> Option<&IndicatorSeries> {
        self.indicators.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use crate::strategy::SniperConfig;
    use chrono::{Duration, TimeZone, Utc};

    fn series_from_closes(closes: &[f64]) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut series = CandleSeries::new("TEST");
        for (i, close) in closes.iter().enumerate() {
            series.push(&Candle {
                date: base + Duration::hours(i as i64),
                open: *close,
                high: close + 0.5,
                low: close - 0.5,
                close: *close,
                volume: 1_000.0,
            });
        }
        series
    }

    /// Decline, a flat shelf, then a gap up that lifts close and RSI through their levels
    /// on the same bar, followed by a slide back down.
    fn shelf_and_breakout() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 120.0 - i as f64 * 0.5).collect();
        closes.extend(std::iter::repeat(100.0).take(12));
        closes.extend((0..12).map(|i| 104.0 + i as f64));
        closes.extend((0..30).map(|i| 115.0 - i as f64 * 1.5));
        closes
    }

    fn small_config() -> RsiConfig {
        RsiConfig {
            rsi_length: 5,
            ema_fast_length: 3,
            ema_slow_length: 10,
            rsi_buy_level: 50.0,
            rsi_exit_level: 50.0,
            min_bars_between_trades: 3,
            count_sell_signals: 3,
            cooldown_policy: CooldownPolicy::Separate,
        }
    }

    #[test]
    fn too_short_series_yields_nothing() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut strategy = RsiStrategy::new(RsiConfig::default());
        let series = series_from_closes(&vec![100.0; 59]);

        assert!(matches!(
            strategy.try_execute(&series),
            Err(EngineError::InsufficientData { need: 60, .. })
        ));
        assert_eq!(strategy.execute(&series), LastBarSignals::default());
        assert!(strategy.signals().is_empty());
        assert_eq!(strategy.last_rsi(), None);
    }

    #[test]
    fn flat_series_never_signals() {
        let mut strategy = RsiStrategy::new(RsiConfig::default());
        let series = series_from_closes(&vec![100.0; 200]);

        let last_bar = strategy.try_execute(&series).unwrap();
        assert_eq!(last_bar, LastBarSignals::default());
        assert!(strategy.signals().is_empty());
        assert_eq!(strategy.last_rsi(), Some(50.0));
        assert_eq!(strategy.last_ema(), Some(100.0));
    }

    #[test]
    fn breakout_buys_on_the_gap_bar() {
        let mut strategy = RsiStrategy::new(small_config());
        let series = series_from_closes(&shelf_and_breakout());

        strategy.try_execute(&series).unwrap();
        assert_eq!(strategy.buy_points().len(), 1);
        let buy = strategy.buy_points()[0];
        assert_eq!(buy.timestamp, series.date[52]);
        assert_eq!(buy.price, series.close[52]);
        assert!(strategy.sell_points().is_empty());
    }

    #[test]
    fn trend_vote_sells_during_the_slide() {
        let mut config = small_config();
        config.count_sell_signals = 2;
        let mut strategy = RsiStrategy::new(config);
        let series = series_from_closes(&shelf_and_breakout());

        strategy.try_execute(&series).unwrap();
        let buy_time = strategy.buy_points()[0].timestamp;
        assert!(strategy.sell_points().iter().any(|p| p.timestamp > buy_time));
        for pair in strategy.sell_points().windows(2) {
            assert!((pair[1].timestamp - pair[0].timestamp).num_hours() >= 3);
        }
    }

    #[test]
    fn buy_and_sell_can_share_a_bar() {
        let series = series_from_closes(&shelf_and_breakout());
        for policy in [CooldownPolicy::Separate, CooldownPolicy::Shared] {
            let mut config = small_config();
            config.min_bars_between_trades = 1;
            config.count_sell_signals = 1;
            config.cooldown_policy = policy;
            let mut strategy = RsiStrategy::new(config);

            strategy.try_execute(&series).unwrap();
            let gap = series.date[52];
            assert_eq!(strategy.buy_points().len(), 1, "{:?}", policy);
            assert_eq!(strategy.buy_points()[0].timestamp, gap);
            assert!(
                strategy.sell_points().iter().any(|p| p.timestamp == gap),
                "{:?} suppressed the sell on the buy bar",
                policy
            );
        }
    }

    #[test]
    fn buys_respect_cooldown() {
        let mut config = small_config();
        config.min_bars_between_trades = 50;
        let mut closes = shelf_and_breakout();
        closes.extend(shelf_and_breakout());
        let series = series_from_closes(&closes);

        let mut strategy = RsiStrategy::new(config);
        strategy.try_execute(&series).unwrap();
        let buys = strategy.buy_points();
        assert_eq!(buys.len(), 2);
        assert!((buys[1].timestamp - buys[0].timestamp).num_hours() >= 50);
    }

    #[test]
    fn shared_cooldown_lets_sells_block_buys() {
        let mut closes = shelf_and_breakout();
        closes.extend(shelf_and_breakout());
        let series = series_from_closes(&closes);

        let mut separate = small_config();
        separate.min_bars_between_trades = 50;
        separate.count_sell_signals = 2;
        let mut shared = separate.clone();
        shared.cooldown_policy = CooldownPolicy::Shared;

        let mut separate_strategy = RsiStrategy::new(separate);
        let mut shared_strategy = RsiStrategy::new(shared);
        separate_strategy.try_execute(&series).unwrap();
        shared_strategy.try_execute(&series).unwrap();

        assert!(shared_strategy.buy_points().len() < separate_strategy.buy_points().len());
    }

    #[test]
    fn sell_vote_threshold_controls_frequency() {
        let series = series_from_closes(&shelf_and_breakout());

        let mut loose = small_config();
        loose.count_sell_signals = 1;
        let mut strict = small_config();
        strict.count_sell_signals = 4;

        let mut loose_strategy = RsiStrategy::new(loose);
        let mut strict_strategy = RsiStrategy::new(strict);
        loose_strategy.try_execute(&series).unwrap();
        strict_strategy.try_execute(&series).unwrap();

        assert!(!loose_strategy.sell_points().is_empty());
        assert!(strict_strategy.sell_points().is_empty());
    }

    #[test]
    fn repeated_execution_resets_signals() {
        let mut strategy = RsiStrategy::new(small_config());
        let series = series_from_closes(&shelf_and_breakout());

        strategy.try_execute(&series).unwrap();
        let first = strategy.signals().clone();
        strategy.try_execute(&series).unwrap();
        assert_eq!(strategy.signals(), &first);
    }

    #[test]
    fn cooldown_policy_travels_through_parameters() {
        let shared = RsiConfig {
            cooldown_policy: CooldownPolicy::Shared,
            ..small_config()
        };
        let parameters = shared.to_parameters();
        assert_eq!(parameters["cooldownPolicy"], 1.0);
        assert_eq!(small_config().to_parameters()["cooldownPolicy"], 0.0);
        assert!(StrategyConfig::Rsi(shared.clone())
            .to_string()
            .contains("cooldownPolicy=1"));

        let flat: HashMap<String, f64> = parameters.into_iter().collect();
        assert_eq!(small_config().with_parameters(&flat), shared);
        assert_eq!(shared.with_parameters(&HashMap::new()), shared);
    }

    #[test]
    fn set_config_rejects_other_variant() {
        let mut strategy = RsiStrategy::new(RsiConfig::default());
        assert!(strategy
            .set_config(StrategyConfig::Sniper(SniperConfig::default()))
            .is_err());

        let replacement = small_config();
        strategy
            .set_config(StrategyConfig::Rsi(replacement.clone()))
            .unwrap();
        assert_eq!(strategy.rsi_config(), &replacement);
        assert_eq!(strategy.min_data_points(), 20);
    }
}
