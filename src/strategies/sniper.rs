use crate::error::{EngineError, EngineResult};
use crate::indicators::{IndicatorKind, IndicatorSeries, IndicatorWindows};
use crate::models::CandleSeries;
use crate::param_utils::{bool_param, get_param_bool, get_param_f64, get_usize_param_min};
use crate::signals::{LastBarSignals, SignalAction, SignalSet};
use crate::strategy::{SignalGenerator, StrategyConfig};
use crate::strategy_utils::{all_finite, crosses_above, crosses_below, finite_pair};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Momentum entry on the averaged RSI+MFI oscillator, gated by trend, volatility and volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SniperConfig {
    /// Look-back for both RSI and MFI.
    pub rsi_length: usize,
    pub ema_fast_length: usize,
    pub ema_slow_length: usize,
    pub atr_length: usize,
    pub atr_sma_length: usize,
    pub volume_sma_length: usize,
    pub rsi_mfi_buy_level: f64,
    pub rsi_mfi_exit_level: f64,
    pub ema_min_delta: f64,
    pub atr_multiplier: f64,
    pub buy_volume_factor: f64,
    pub sell_volume_factor: f64,
    pub deduplicate_signals: bool,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            rsi_length: 14,
            ema_fast_length: 8,
            ema_slow_length: 50,
            atr_length: 14,
            atr_sma_length: 14,
            volume_sma_length: 20,
            rsi_mfi_buy_level: 62.0,
            rsi_mfi_exit_level: 38.0,
            ema_min_delta: 0.0001,
            atr_multiplier: 0.5,
            buy_volume_factor: 1.2,
            sell_volume_factor: 0.8,
            deduplicate_signals: false,
        }
    }
}

impl SniperConfig {
    pub fn to_parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("rsiLength".to_string(), self.rsi_length as f64),
            ("emaFastLength".to_string(), self.ema_fast_length as f64),
            ("emaSlowLength".to_string(), self.ema_slow_length as f64),
            ("atrLength".to_string(), self.atr_length as f64),
            ("atrSmaLength".to_string(), self.atr_sma_length as f64),
            ("volumeSmaLength".to_string(), self.volume_sma_length as f64),
            ("rsiMfiBuyLevel".to_string(), self.rsi_mfi_buy_level),
            ("rsiMfiExitLevel".to_string(), self.rsi_mfi_exit_level),
            ("emaMinDelta".to_string(), self.ema_min_delta),
            ("atrMultiplier".to_string(), self.atr_multiplier),
            ("buyVolumeFactor".to_string(), self.buy_volume_factor),
            ("sellVolumeFactor".to_string(), self.sell_volume_factor),
            (
                "deduplicateSignals".to_string(),
                bool_param(self.deduplicate_signals),
            ),
        ])
    }

    pub fn with_parameters(&self, parameters: &HashMap<String, f64>) -> Self {
        let length = |key: &str, current: usize| get_usize_param_min(parameters, key, current, 1);
        let value = |key: &str, current: f64| get_param_f64(parameters, key, current);
        Self {
            rsi_length: length("rsiLength", self.rsi_length),
            ema_fast_length: length("emaFastLength", self.ema_fast_length),
            ema_slow_length: length("emaSlowLength", self.ema_slow_length),
            atr_length: length("atrLength", self.atr_length),
            atr_sma_length: length("atrSmaLength", self.atr_sma_length),
            volume_sma_length: length("volumeSmaLength", self.volume_sma_length),
            rsi_mfi_buy_level: value("rsiMfiBuyLevel", self.rsi_mfi_buy_level),
            rsi_mfi_exit_level: value("rsiMfiExitLevel", self.rsi_mfi_exit_level),
            ema_min_delta: value("emaMinDelta", self.ema_min_delta),
            atr_multiplier: value("atrMultiplier", self.atr_multiplier),
            buy_volume_factor: value("buyVolumeFactor", self.buy_volume_factor),
            sell_volume_factor: value("sellVolumeFactor", self.sell_volume_factor),
            deduplicate_signals: get_param_bool(
                parameters,
                "deduplicateSignals",
                self.deduplicate_signals,
            ),
        }
    }

    fn windows(&self) -> IndicatorWindows {
        IndicatorWindows {
            rsi: Some(self.rsi_length),
            mfi: Some(self.rsi_length),
            ema_fast: Some(self.ema_fast_length),
            ema_slow: Some(self.ema_slow_length),
            atr: Some(self.atr_length),
            atr_average: Some(self.atr_sma_length),
            volume_average: Some(self.volume_sma_length),
        }
    }

    /// First bar at which every indicator, the fast-EMA slope and the ATR average are formed.
    fn start_index(&self) -> usize {
        [
            self.rsi_length,
            self.ema_fast_length + 1,
            self.ema_slow_length,
            self.atr_length + self.atr_sma_length,
            self.volume_sma_length,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

pub struct SniperStrategy {
    config: SniperConfig,
    signals: SignalSet,
    indicators: Option<IndicatorSeries>,
}

impl SniperStrategy {
    pub fn new(config: SniperConfig) -> Self {
        Self {
            config,
            signals: SignalSet::default(),
            indicators: None,
        }
    }
}

impl SignalGenerator for SniperStrategy {
    fn template_id(&self) -> &'static str {
        "sniper"
    }

    fn min_data_points(&self) -> usize {
        self.config.start_index() + 1
    }

    fn try_execute(&mut self, candles: &CandleSeries) -> EngineResult<LastBarSignals> {
        self.signals.clear();
        self.indicators = None;

        candles.validate_lengths()?;
        let n = candles.len();
        let start = self.config.start_index();
        if start >= n {
            return Err(EngineError::InsufficientData {
                strategy: self.template_id().to_string(),
                have: n,
                need: start + 1,
            });
        }

        let indicators = IndicatorSeries::compute(candles, &self.config.windows())?;
        let rsi = indicators.require(IndicatorKind::Rsi)?;
        let mfi = indicators.require(IndicatorKind::Mfi)?;
        let ema_fast = indicators.require(IndicatorKind::EmaFast)?;
        let ema_slow = indicators.require(IndicatorKind::EmaSlow)?;
        let atr = indicators.require(IndicatorKind::Atr)?;
        let atr_average = indicators.require(IndicatorKind::AtrAverage)?;
        let volume_average = indicators.require(IndicatorKind::VolumeAverage)?;

        let cfg = &self.config;
        // Advisory only: tracks what this generator signalled, not what was filled.
        let mut in_position = false;
        let mut last_bar = LastBarSignals::default();

        for i in start.max(1)..n {
            let Some(pairs) = finite_pair(&[rsi, mfi, ema_fast], i) else {
                continue;
            };
            let &[(prev_rsi, curr_rsi), (prev_mfi, curr_mfi), (prev_fast, curr_fast)] =
                pairs.as_slice()
            else {
                continue;
            };
            let price = candles.close[i];
            let volume = candles.volume[i];
            if !all_finite(&[
                price,
                volume,
                ema_slow[i],
                atr[i],
                atr_average[i],
                volume_average[i],
            ]) {
                continue;
            }

            let prev_osc = (prev_rsi + prev_mfi) / 2.0;
            let curr_osc = (curr_rsi + curr_mfi) / 2.0;
            let slope = curr_fast - prev_fast;
            let volatile = atr[i] > atr_average[i] * cfg.atr_multiplier;

            let mut buy = crosses_above(
                prev_osc,
                curr_osc,
                cfg.rsi_mfi_buy_level,
                cfg.rsi_mfi_buy_level,
            ) && slope > cfg.ema_min_delta
                && price > ema_slow[i]
                && volatile
                && volume > volume_average[i] * cfg.buy_volume_factor;

            let mut sell = crosses_below(
                prev_osc,
                curr_osc,
                cfg.rsi_mfi_exit_level,
                cfg.rsi_mfi_exit_level,
            ) && slope < -cfg.ema_min_delta
                && price < ema_slow[i]
                && volatile
                && volume > volume_average[i] * cfg.sell_volume_factor;

            if cfg.deduplicate_signals {
                if in_position {
                    buy = false;
                } else {
                    sell = false;
                }
            }

            let date = candles.date[i];
            if buy {
                debug!(
                    "[sniper] BUY {} close={:.2} osc={:.1} slope={:.5} atr={:.4}",
                    date, price, curr_osc, slope, atr[i]
                );
                in_position = true;
                self.signals.record(SignalAction::Buy, date, price);
                last_bar.buy |= i == n - 1;
            }
            if sell {
                debug!(
                    "[sniper] SELL {} close={:.2} osc={:.1} slope={:.5} atr={:.4}",
                    date, price, curr_osc, slope, atr[i]
                );
                in_position = false;
                self.signals.record(SignalAction::Sell, date, price);
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
        StrategyConfig::Sniper(self.config.clone())
    }

    fn set_config(&mut self, config: StrategyConfig) -> EngineResult<()> {
        match config {
            StrategyConfig::Sniper(config) => {
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
    use chrono::{Duration, TimeZone, Utc};

    fn breakout_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 120.0 - i as f64 * 0.5).collect();
        closes.extend(std::iter::repeat(100.0).take(12));
        closes.extend((0..12).map(|i| 104.0 + i as f64));
        closes.extend((0..30).map(|i| 115.0 - i as f64 * 1.5));
        closes
    }

    /// Volume doubles on every bar that moves a full point or more.
    fn series_with_volume_spikes(closes: &[f64]) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut series = CandleSeries::new("SNIPE");
        for (i, close) in closes.iter().enumerate() {
            let moved = i > 0 && (close - closes[i - 1]).abs() >= 1.0;
            series.push(&Candle {
                date: base + Duration::minutes(15 * i as i64),
                open: *close,
                high: close + 0.5,
                low: close - 0.5,
                close: *close,
                volume: if moved { 2_000.0 } else { 1_000.0 },
            });
        }
        series
    }

    fn fast_config() -> SniperConfig {
        SniperConfig {
            rsi_length: 5,
            ema_fast_length: 3,
            ema_slow_length: 10,
            atr_length: 5,
            atr_sma_length: 5,
            volume_sma_length: 5,
            rsi_mfi_buy_level: 55.0,
            rsi_mfi_exit_level: 45.0,
            ..Default::default()
        }
    }

    fn twice(closes: Vec<f64>) -> Vec<f64> {
        let mut doubled = closes.clone();
        doubled.extend(closes);
        doubled
    }

    #[test]
    fn breakout_and_breakdown_fire() {
        let _ = env_logger::builder().is_test(true).try_init();
        let series = series_with_volume_spikes(&breakout_closes());
        let mut strategy = SniperStrategy::new(fast_config());

        let last_bar = strategy.try_execute(&series).unwrap();
        assert_eq!(last_bar, LastBarSignals::default());
        assert_eq!(strategy.buy_points().len(), 1);
        assert_eq!(strategy.sell_points().len(), 1);
        assert_eq!(strategy.buy_points()[0].timestamp, series.date[52]);
        assert_eq!(strategy.sell_points()[0].timestamp, series.date[67]);
        assert!(strategy.indicators().is_some());
    }

    #[test]
    fn signal_on_final_bar_is_reported() {
        let closes: Vec<f64> = breakout_closes().into_iter().take(53).collect();
        let series = series_with_volume_spikes(&closes);
        let mut strategy = SniperStrategy::new(fast_config());

        let last_bar = strategy.try_execute(&series).unwrap();
        assert!(last_bar.buy);
        assert!(!last_bar.sell);
    }

    #[test]
    fn dedup_suppresses_repeated_buys() {
        let series = series_with_volume_spikes(&twice(breakout_closes()));
        let mut config = fast_config();
        config.sell_volume_factor = 50.0;

        let mut plain = SniperStrategy::new(config.clone());
        plain.try_execute(&series).unwrap();
        assert_eq!(plain.buy_points().len(), 2);
        assert!(plain.sell_points().is_empty());

        config.deduplicate_signals = true;
        let mut deduped = SniperStrategy::new(config);
        deduped.try_execute(&series).unwrap();
        assert_eq!(deduped.buy_points().len(), 1);
    }

    #[test]
    fn dedup_suppresses_sells_while_flat() {
        let series = series_with_volume_spikes(&twice(breakout_closes()));
        let mut config = fast_config();
        config.buy_volume_factor = 50.0;

        let mut plain = SniperStrategy::new(config.clone());
        plain.try_execute(&series).unwrap();
        assert!(plain.buy_points().is_empty());
        assert_eq!(plain.sell_points().len(), 2);

        config.deduplicate_signals = true;
        let mut deduped = SniperStrategy::new(config);
        deduped.try_execute(&series).unwrap();
        assert!(deduped.sell_points().is_empty());
    }

    #[test]
    fn malformed_series_is_rejected() {
        let mut series = series_with_volume_spikes(&breakout_closes());
        series.high.pop();
        let mut strategy = SniperStrategy::new(SniperConfig::default());

        assert!(matches!(
            strategy.try_execute(&series),
            Err(EngineError::MalformedSeries { .. })
        ));
        assert_eq!(strategy.execute(&series), LastBarSignals::default());
        assert!(strategy.signals().is_empty());

        assert!(matches!(
            strategy.try_execute(&CandleSeries::default()),
            Err(EngineError::MalformedSeries { .. })
        ));
    }

    #[test]
    fn warm_up_boundary_matches_longest_window() {
        let strategy = SniperStrategy::new(SniperConfig::default());
        assert_eq!(strategy.min_data_points(), 51);

        let mut short = SniperStrategy::new(SniperConfig::default());
        let series = series_with_volume_spikes(&vec![100.0; 50]);
        assert!(matches!(
            short.try_execute(&series),
            Err(EngineError::InsufficientData { have: 50, need: 51, .. })
        ));
    }

    #[test]
    fn parameters_round_trip_through_overrides() {
        let config = fast_config();
        let overrides: HashMap<String, f64> = config.to_parameters().into_iter().collect();
        assert_eq!(SniperConfig::default().with_parameters(&overrides), config);
    }
}
