use std::sync::{Arc, Mutex};

/// Shared, cloneable view of a running grid search.
#[derive(Clone, Default)]
pub struct OptimizerStatus {
    inner: Arc<Mutex<OptimizerStatusData>>,
}

#[derive(Default)]
struct OptimizerStatusData {
    phase: String,
    total_candidates: usize,
    completed_candidates: usize,
    best_profit: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerStatusSnapshot {
    pub phase: String,
    pub total_candidates: usize,
    pub completed_candidates: usize,
    pub best_profit: Option<f64>,
}

impl OptimizerStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(OptimizerStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    pub fn start(&self, total_candidates: usize) {
        if let Ok(mut data) = self.inner.lock() {
            data.total_candidates = total_candidates;
            data.completed_candidates = 0;
            data.best_profit = None;
        }
    }

    /// Counts one evaluated candidate and keeps the highest profit seen.
    pub fn record_candidate(&self, profit: f64) {
        if let Ok(mut data) = self.inner.lock() {
            data.completed_candidates += 1;
            data.best_profit = Some(match data.best_profit {
                Some(best) if best >= profit => best,
                _ => profit,
            });
        }
    }

    pub fn snapshot(&self) -> OptimizerStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            OptimizerStatusSnapshot {
                phase: data.phase.clone(),
                total_candidates: data.total_candidates,
                completed_candidates: data.completed_candidates,
                best_profit: data.best_profit,
            }
        } else {
            OptimizerStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_candidates: 0,
                completed_candidates: 0,
                best_profit: None,
            }
        }
    }
}
