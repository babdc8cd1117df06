use crate::models::{Candle, CandleSeries};
use log::warn;

/// Builds a column series from candles in arbitrary order.
///
/// Candles are sorted by date and later candles sharing a timestamp with an
/// earlier one are dropped, so the result always satisfies the ordering
/// invariant of [`CandleSeries`].
pub fn build_series(symbol: &str, candles: &[Candle]) -> CandleSeries {
    let mut sorted: Vec<&Candle> = candles.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date));

    let mut series = CandleSeries::new(symbol);
    let mut dropped = 0usize;
    for candle in sorted {
        if series.date.last() == Some(&candle.date) {
            dropped += 1;
            continue;
        }
        series.push(candle);
    }

    if dropped > 0 {
        warn!(
            "Dropped {} candle(s) with duplicate timestamps for {}",
            dropped, symbol
        );
    }
    series
}

/// Normalizes a ticker string by trimming whitespace and uppercasing.
pub fn normalize_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(offset_days: i64, close: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Candle {
            date: base + Duration::days(offset_days),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn build_series_sorts_and_drops_duplicates() {
        let candles = vec![candle(2, 102.0), candle(0, 100.0), candle(1, 101.0), candle(1, 999.0)];

        let series = build_series("AAA", &candles);
        assert_eq!(series.len(), 3);
        assert!(series.validate().is_ok());
        assert_eq!(series.close, vec![100.0, 101.0, 102.0]);
    }

    #[test]
    fn normalize_symbol_rejects_blank() {
        assert_eq!(normalize_symbol("  btcusdt "), Some("BTCUSDT".to_string()));
        assert_eq!(normalize_symbol("   "), None);
    }
}
