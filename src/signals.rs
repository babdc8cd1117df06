use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A buy or sell event at one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
}

/// Ordered buy and sell events produced by one generator execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub buys: Vec<SignalPoint>,
    pub sells: Vec<SignalPoint>,
}

impl SignalSet {
    pub fn clear(&mut self) {
        self.buys.clear();
        self.sells.clear();
    }

    pub fn record(&mut self, action: SignalAction, timestamp: DateTime<Utc>, price: f64) {
        let point = SignalPoint { timestamp, price };
        match action {
            SignalAction::Buy => self.buys.push(point),
            SignalAction::Sell => self.sells.push(point),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    /// Both lists merged into one chronological stream; buys precede sells on the same bar.
    pub fn chronological(&self) -> Vec<(SignalAction, SignalPoint)> {
        let mut merged: Vec<(SignalAction, SignalPoint)> = self
            .buys
            .iter()
            .map(|p| (SignalAction::Buy, *p))
            .chain(self.sells.iter().map(|p| (SignalAction::Sell, *p)))
            .collect();
        merged.sort_by_key(|(action, point)| (point.timestamp, *action == SignalAction::Sell));
        merged
    }
}

/// Whether a buy or sell fired on the final bar of the series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBarSignals {
    pub buy: bool,
    pub sell: bool,
}

/// Exact-timestamp membership lookup over a signal list.
#[derive(Debug, Clone, Default)]
pub struct SignalIndex {
    timestamps: HashSet<DateTime<Utc>>,
}

impl SignalIndex {
    pub fn new(points: &[SignalPoint]) -> Self {
        Self {
            timestamps: points.iter().map(|p| p.timestamp).collect(),
        }
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.timestamps.contains(timestamp)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
