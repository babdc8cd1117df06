use crate::error::{EngineError, EngineResult};
use crate::models::CandleSeries;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// All series returned here are index-aligned with their input and padded
// with NaN until the look-back window is full.

/// Simple moving average. A window touching a NaN yields NaN.
pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut sma_values = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return sma_values;
    }

    let mut window_sum = 0.0f64;
    let mut invalid_in_window = 0usize;
    for i in 0..values.len() {
        let incoming = values[i];
        if incoming.is_finite() {
            window_sum += incoming;
        } else {
            invalid_in_window += 1;
        }
        if i >= period {
            let dropped = values[i - period];
            if dropped.is_finite() {
                window_sum -= dropped;
            } else {
                invalid_in_window -= 1;
            }
        }
        if i + 1 >= period && invalid_in_window == 0 {
            sma_values[i] = window_sum / period as f64;
        }
    }

    sma_values
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema_values = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return ema_values;
    }

    let seed = values[..period].iter().sum::<f64>() / period as f64;
    ema_values[period - 1] = seed;

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut prev = seed;
    for i in period..values.len() {
        let ema = prev + multiplier * (values[i] - prev);
        ema_values[i] = ema;
        prev = ema;
    }

    ema_values
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Wilder RSI; the first defined value sits at index `period`.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut rsi_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return rsi_values;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi_values
}

/// Money Flow Index over `period` typical-price changes.
///
/// Bars whose typical price is unchanged contribute to neither flow, and a
/// window with no flow at all reads as a neutral 50.
pub fn calculate_mfi(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    volumes: &[f64],
    period: usize,
) -> Vec<f64> {
    let n = closes.len();
    let mut mfi_values = vec![f64::NAN; n];
    if period == 0 || n < period + 1 || highs.len() < n || lows.len() < n || volumes.len() < n {
        return mfi_values;
    }

    let typical_prices: Vec<f64> = (0..n)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();

    for (i, mfi_value) in mfi_values.iter_mut().enumerate().skip(period) {
        let mut positive_money_flow = 0.0;
        let mut negative_money_flow = 0.0;
        for j in (i + 1 - period)..=i {
            let flow = typical_prices[j] * volumes[j];
            if typical_prices[j] > typical_prices[j - 1] {
                positive_money_flow += flow;
            } else if typical_prices[j] < typical_prices[j - 1] {
                negative_money_flow += flow;
            }
        }
        *mfi_value = rsi_from_avgs(positive_money_flow, negative_money_flow);
    }

    mfi_values
}

/// Wilder ATR aligned to candle indices; the first defined value sits at index `period`.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut atr = vec![f64::NAN; n];
    if period == 0 || n < period + 1 || highs.len() < n || lows.len() < n {
        return atr;
    }

    let mut tr_sum = 0.0f64;
    for i in 1..n {
        let prev_close = closes[i - 1];
        let tr = (highs[i] - lows[i])
            .max((highs[i] - prev_close).abs())
            .max((lows[i] - prev_close).abs());

        if i <= period {
            tr_sum += tr;
            if i == period {
                atr[i] = tr_sum / period as f64;
            }
        } else {
            atr[i] = ((atr[i - 1] * (period as f64 - 1.0)) + tr) / period as f64;
        }
    }

    atr
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndicatorKind {
    Rsi,
    EmaFast,
    EmaSlow,
    Mfi,
    Atr,
    AtrAverage,
    VolumeAverage,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::EmaFast => "ema_fast",
            IndicatorKind::EmaSlow => "ema_slow",
            IndicatorKind::Mfi => "mfi",
            IndicatorKind::Atr => "atr",
            IndicatorKind::AtrAverage => "atr_average",
            IndicatorKind::VolumeAverage => "volume_average",
        };
        f.write_str(name)
    }
}

/// Look-back lengths for the indicators a strategy needs. `None` skips the indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorWindows {
    pub rsi: Option<usize>,
    pub ema_fast: Option<usize>,
    pub ema_slow: Option<usize>,
    pub mfi: Option<usize>,
    pub atr: Option<usize>,
    /// Smoothing length applied on top of ATR; ignored without `atr`.
    pub atr_average: Option<usize>,
    pub volume_average: Option<usize>,
}

/// Derived series for one candle series, keyed by indicator.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    len: usize,
    values: HashMap<IndicatorKind, Vec<f64>>,
}

impl IndicatorSeries {
    pub fn compute(candles: &CandleSeries, windows: &IndicatorWindows) -> EngineResult<Self> {
        candles.validate_lengths()?;

        let mut values = HashMap::new();
        if let Some(period) = windows.rsi {
            values.insert(IndicatorKind::Rsi, calculate_rsi(&candles.close, period));
        }
        if let Some(period) = windows.ema_fast {
            values.insert(IndicatorKind::EmaFast, calculate_ema(&candles.close, period));
        }
        if let Some(period) = windows.ema_slow {
            values.insert(IndicatorKind::EmaSlow, calculate_ema(&candles.close, period));
        }
        if let Some(period) = windows.mfi {
            values.insert(
                IndicatorKind::Mfi,
                calculate_mfi(
                    &candles.high,
                    &candles.low,
                    &candles.close,
                    &candles.volume,
                    period,
                ),
            );
        }
        if let Some(period) = windows.atr {
            let atr = calculate_atr(&candles.high, &candles.low, &candles.close, period);
            if let Some(smoothing) = windows.atr_average {
                values.insert(IndicatorKind::AtrAverage, calculate_sma(&atr, smoothing));
            }
            values.insert(IndicatorKind::Atr, atr);
        }
        if let Some(period) = windows.volume_average {
            values.insert(
                IndicatorKind::VolumeAverage,
                calculate_sma(&candles.volume, period),
            );
        }

        Ok(Self {
            len: candles.len(),
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, kind: IndicatorKind) -> Option<&[f64]> {
        self.values.get(&kind).map(Vec::as_slice)
    }

    pub fn require(&self, kind: IndicatorKind) -> EngineResult<&[f64]> {
        self.get(kind)
            .ok_or_else(|| EngineError::MissingIndicator(kind.to_string()))
    }

    /// Value at the final bar, if the indicator was computed and is defined there.
    pub fn last(&self, kind: IndicatorKind) -> Option<f64> {
        self.get(kind)
            .and_then(|series| series.last().copied())
            .filter(|value| value.is_finite())
    }
}
