use crate::backtester::{run_backtest, BacktestOptions};
use crate::error::{EngineError, EngineResult};
use crate::models::{CandleSeries, OptimizationResult, ParameterRange};
use crate::optimizer_status::OptimizerStatus;
use crate::strategy::{create_strategy, StrategyConfig};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Named parameter axes in declaration order. The first axis varies slowest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSpace {
    axes: Vec<(String, ParameterRange)>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, name: impl Into<String>, range: ParameterRange) -> Self {
        self.axes.push((name.into(), range));
        self
    }

    pub fn axes(&self) -> &[(String, ParameterRange)] {
        &self.axes
    }

    /// Number of grid cells, 0 for an empty or invalid space. Saturates at `usize::MAX`.
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.cell_count().unwrap_or(usize::MAX)
    }

    /// `None` when the product of the axis sizes overflows.
    fn cell_count(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |total, (_, range)| total.checked_mul(range.count()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates every range and the grid size, then materializes each axis' values.
    pub fn grid(&self) -> EngineResult<ParameterGrid> {
        if self.axes.is_empty() {
            return Err(EngineError::EmptyParameterSpace);
        }
        for (name, range) in &self.axes {
            range.validate(name)?;
        }
        let cells = self.cell_count().ok_or(EngineError::GridTooLarge {
            axes: self.axes.len(),
        })?;
        if cells == 0 {
            return Err(EngineError::EmptyParameterSpace);
        }

        let mut names = Vec::with_capacity(self.axes.len());
        let mut values = Vec::with_capacity(self.axes.len());
        for (name, range) in &self.axes {
            names.push(name.clone());
            values.push(range.values(name)?);
        }
        let total = values
            .iter()
            .try_fold(1usize, |total, axis| total.checked_mul(axis.len()))
            .ok_or(EngineError::GridTooLarge { axes: names.len() })?;
        Ok(ParameterGrid {
            names,
            values,
            total,
        })
    }
}

/// Cartesian product of a [`ParameterSpace`], addressable by enumeration index.
#[derive(Debug, Clone)]
pub struct ParameterGrid {
    names: Vec<String>,
    values: Vec<Vec<f64>>,
    total: usize,
}

impl ParameterGrid {
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Decodes `index` as a mixed-radix number whose last digit is the last axis.
    pub fn candidate_at(&self, index: usize) -> Option<HashMap<String, f64>> {
        if index >= self.total {
            return None;
        }
        let mut remainder = index;
        let mut candidate = HashMap::with_capacity(self.names.len());
        for (name, values) in self.names.iter().zip(&self.values).rev() {
            let digit = remainder % values.len();
            remainder /= values.len();
            candidate.insert(name.clone(), values[digit]);
        }
        Some(candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = HashMap<String, f64>> + '_ {
        (0..self.total).filter_map(move |index| self.candidate_at(index))
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptimizerOptions {
    /// Spread candidates over the rayon pool.
    pub parallel: bool,
    /// Stop starting new candidates once this much time has passed.
    pub time_budget: Option<Duration>,
    pub backtest: BacktestOptions,
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct GridSearchOutcome {
    pub best: OptimizationResult,
    /// Enumeration index of the winning candidate.
    pub best_index: usize,
    pub evaluated: usize,
    pub total: usize,
    /// False when the time budget cut the enumeration short.
    pub complete: bool,
}

struct Scored {
    index: usize,
    result: OptimizationResult,
}

/// Highest profit wins; equal profits go to the earlier candidate.
fn pick_better(current: Option<Scored>, challenger: Option<Scored>) -> Option<Scored> {
    match (current, challenger) {
        (Some(a), Some(b)) => {
            let b_wins = b.result.profit > a.result.profit
                || (b.result.profit == a.result.profit && b.index < a.index);
            Some(if b_wins { b } else { a })
        }
        (a, None) => a,
        (None, b) => b,
    }
}

pub struct GridSearch<'a> {
    candles: &'a CandleSeries,
    base: &'a StrategyConfig,
    status: OptimizerStatus,
}

impl<'a> GridSearch<'a> {
    pub fn new(candles: &'a CandleSeries, base: &'a StrategyConfig) -> Self {
        Self {
            candles,
            base,
            status: OptimizerStatus::new(),
        }
    }

    pub fn with_status(mut self, status: OptimizerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> &OptimizerStatus {
        &self.status
    }

    /// Builds a fresh config and generator for one grid cell and backtests it.
    pub fn evaluate_candidate(
        &self,
        parameters: &HashMap<String, f64>,
        options: BacktestOptions,
    ) -> EngineResult<OptimizationResult> {
        let config = self.base.with_parameters(parameters);
        let mut generator = create_strategy(config.clone());
        let report = run_backtest(generator.as_mut(), self.candles, options)?;
        Ok(report.into_result(config))
    }

    pub fn run(
        &self,
        space: &ParameterSpace,
        options: &OptimizerOptions,
    ) -> EngineResult<GridSearchOutcome> {
        self.candles.validate()?;
        let known = self.base.parameters();
        if let Some((name, _)) = space.axes().iter().find(|(name, _)| !known.contains_key(name)) {
            return Err(EngineError::UnknownParameter {
                name: name.clone(),
                strategy: self.base.kind().to_string(),
            });
        }
        let grid = space.grid()?;
        let total = grid.len();

        info!(
            "Grid search for {} over {} candidates ({})",
            self.base.kind(),
            total,
            if options.parallel {
                "parallel"
            } else {
                "sequential"
            }
        );
        self.status.set_phase(format!("Optimizing {}", self.base.kind()));
        self.status.start(total);

        let progress = if options.show_progress {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let started = Instant::now();
        let evaluated = AtomicUsize::new(0);
        let out_of_time =
            || matches!(options.time_budget, Some(budget) if started.elapsed() >= budget);

        let evaluate_cell = |index: usize| -> EngineResult<Option<Scored>> {
            if out_of_time() {
                return Ok(None);
            }
            let Some(parameters) = grid.candidate_at(index) else {
                return Ok(None);
            };
            let result = self.evaluate_candidate(&parameters, options.backtest)?;
            evaluated.fetch_add(1, Ordering::Relaxed);
            self.status.record_candidate(result.profit);
            progress.inc(1);
            Ok(Some(Scored { index, result }))
        };

        let best = if options.parallel {
            (0..total)
                .into_par_iter()
                .map(evaluate_cell)
                .try_reduce(|| None, |a, b| Ok(pick_better(a, b)))?
        } else {
            let mut best = None;
            for index in 0..total {
                if out_of_time() {
                    break;
                }
                best = pick_better(best, evaluate_cell(index)?);
            }
            best
        };

        progress.finish_and_clear();
        let evaluated = evaluated.into_inner();
        let complete = evaluated == total;
        if !complete {
            warn!(
                "Time budget exhausted after {}/{} candidates; best result covers a partial grid",
                evaluated, total
            );
        }
        self.status.set_phase(if complete { "Completed" } else { "Stopped" });

        let best = best.ok_or(EngineError::NoCandidateEvaluated)?;
        info!(
            "Best candidate #{} profit {:.2} after {:.1}s",
            best.index,
            best.result.profit,
            started.elapsed().as_secs_f64()
        );

        Ok(GridSearchOutcome {
            best: best.result,
            best_index: best.index,
            evaluated,
            total,
            complete,
        })
    }
}

/// Grid-searches `space` around `base` and returns the most profitable candidate.
pub fn optimize(
    base: &StrategyConfig,
    candles: &CandleSeries,
    space: &ParameterSpace,
    options: &OptimizerOptions,
) -> EngineResult<GridSearchOutcome> {
    GridSearch::new(candles, base).run(space, options)
}
