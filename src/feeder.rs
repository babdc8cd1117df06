use crate::candle_utils::{build_series, normalize_symbol};
use crate::models::{Candle, CandleSeries};
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Source of historical candles for one instrument.
pub trait QuoteFeeder {
    fn get_quote(&self, symbol: &str) -> Result<CandleSeries>;
}

/// On-disk layouts accepted by [`JsonFileFeeder`].
#[derive(Deserialize)]
#[serde(untagged)]
enum QuoteDocument {
    Columns(CandleSeries),
    Rows(Vec<Candle>),
}

/// Reads candles from JSON files.
///
/// `path` is either a single document or a directory holding one
/// `<SYMBOL>.json` document per instrument. Documents are column-oriented
/// (`{symbol,date,open,high,low,close,volume}`) or an array of row candles;
/// dates are RFC 3339.
#[derive(Debug, Clone)]
pub struct JsonFileFeeder {
    path: PathBuf,
}

impl JsonFileFeeder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn document_path(&self, symbol: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{}.json", symbol))
        } else {
            self.path.clone()
        }
    }
}

impl QuoteFeeder for JsonFileFeeder {
    fn get_quote(&self, symbol: &str) -> Result<CandleSeries> {
        let symbol =
            normalize_symbol(symbol).ok_or_else(|| anyhow!("Symbol must not be empty"))?;
        let path = self.document_path(&symbol);
        debug!("Reading quotes for {} from {}", symbol, path.display());

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read market data from {}", path.display()))?;
        let document: QuoteDocument = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse market data in {}", path.display()))?;

        let series = match document {
            QuoteDocument::Columns(mut series) => {
                match normalize_symbol(&series.symbol) {
                    Some(found) if found != symbol => {
                        return Err(anyhow!(
                            "{} holds quotes for {}, not {}",
                            path.display(),
                            found,
                            symbol
                        ));
                    }
                    _ => series.symbol = symbol.clone(),
                }
                series
            }
            QuoteDocument::Rows(candles) => build_series(&symbol, &candles),
        };

        series
            .validate()
            .with_context(|| format!("Invalid market data in {}", path.display()))?;
        info!(
            "Loaded {} candle(s) for {} from {}",
            series.len(),
            symbol,
            path.display()
        );
        Ok(series)
    }
}
