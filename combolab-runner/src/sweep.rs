//! Parallel candidate sweeps over one shared price table.
//!
//! The table and evaluator are built once and shared read-only (`Arc`) by
//! every rayon worker. Output rows come back in input order regardless of
//! scheduling, and a candidate that fails to evaluate is recorded as a
//! failure without stopping the rest of the batch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use combolab_core::{
    ComboHash, Direction, Evaluation, EvaluationResult, Evaluator, PriceTable, SignalScorer,
    Trade, WeightedCombination,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, Level};

use crate::candidates::{Candidate, CandidateFailure, CandidateSet};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

// ─── Hold-time window ────────────────────────────────────────────────

/// Keep only trades whose holding time falls inside a window (minutes).
///
/// Hold time comes from the table's timestamps when present, otherwise
/// from the bar count (one bar = one minute).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldFilter {
    pub min_mins: Option<f64>,
    pub max_mins: Option<f64>,
}

impl HoldFilter {
    pub fn accepts(&self, minutes: f64) -> bool {
        self.min_mins.map_or(true, |lo| minutes >= lo)
            && self.max_mins.map_or(true, |hi| minutes <= hi)
    }

    pub fn apply(&self, table: &PriceTable, trades: &[Trade]) -> Vec<Trade> {
        trades
            .iter()
            .filter(|t| {
                let mins = table
                    .hold_minutes(t)
                    .unwrap_or_else(|| t.bars_held() as f64);
                self.accepts(mins)
            })
            .cloned()
            .collect()
    }
}

/// Evaluate one combination, re-aggregating over the hold window if set.
pub fn evaluate_filtered(
    evaluator: &dyn Evaluator,
    table: &PriceTable,
    combination: &WeightedCombination,
    direction: Direction,
    hold_filter: Option<&HoldFilter>,
) -> Evaluation {
    let evaluation = evaluator.evaluate(table, combination, direction);
    match hold_filter {
        None => evaluation,
        Some(filter) => {
            let trades = filter.apply(table, &evaluation.trades);
            Evaluation {
                result: evaluator.aggregate(&trades),
                trades,
            }
        }
    }
}

// ─── Sweep ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOptions {
    pub direction: Direction,
    /// Worker threads; 0 uses rayon's global pool.
    pub threads: usize,
    pub hold_filter: Option<HoldFilter>,
    pub parallel: bool,
    /// Log progress every N percent; 0 disables progress logging.
    pub progress_every_pct: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Long,
            threads: 0,
            hold_filter: None,
            parallel: true,
            progress_every_pct: 10,
        }
    }
}

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub index: usize,
    pub combination: WeightedCombination,
    pub hash: ComboHash,
    pub direction: Direction,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Successful rows, in candidate order.
    pub rows: Vec<SweepRow>,
    /// Parse and evaluation failures, in candidate order.
    pub failures: Vec<CandidateFailure>,
    pub elapsed: Duration,
}

impl SweepOutcome {
    pub fn evaluated(&self) -> usize {
        self.rows.len()
    }

    /// Candidates per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows.len() as f64 / secs
        } else {
            0.0
        }
    }
}

pub struct Sweep {
    evaluator: Arc<dyn Evaluator>,
    table: Arc<PriceTable>,
    options: SweepOptions,
}

impl Sweep {
    pub fn new(evaluator: Arc<dyn Evaluator>, table: Arc<PriceTable>, options: SweepOptions) -> Self {
        Self {
            evaluator,
            table,
            options,
        }
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    pub fn table(&self) -> &PriceTable {
        &self.table
    }

    pub fn run(&self, candidates: &CandidateSet) -> Result<SweepOutcome, SweepError> {
        self.run_with_progress(candidates, |_, _, _| {})
    }

    /// Run the sweep, calling `progress(done, total, row)` after each
    /// successful evaluation. `done` counts completions, not input position.
    pub fn run_with_progress<F>(
        &self,
        candidates: &CandidateSet,
        progress: F,
    ) -> Result<SweepOutcome, SweepError>
    where
        F: Fn(usize, usize, &SweepRow) + Send + Sync,
    {
        let start = Instant::now();
        let total = candidates.candidates.len();
        let done = AtomicUsize::new(0);
        let step = progress_step(total, self.options.progress_every_pct);

        info!(
            candidates = total,
            parse_failures = candidates.failures.len(),
            direction = %self.options.direction,
            evaluator = self.evaluator.name(),
            "starting sweep"
        );

        let eval_one = |candidate: &Candidate| -> Result<SweepRow, CandidateFailure> {
            let row = self.evaluate_candidate(candidate)?;
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if step > 0 && (n % step == 0 || n == total) {
                info!(
                    done = n,
                    total,
                    pct = n * 100 / total.max(1),
                    "sweep progress"
                );
            }
            progress(n, total, &row);
            Ok(row)
        };

        let outcomes: Vec<Result<SweepRow, CandidateFailure>> = if !self.options.parallel {
            candidates.candidates.iter().map(eval_one).collect()
        } else if self.options.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.threads)
                .build()?;
            pool.install(|| candidates.candidates.par_iter().map(eval_one).collect())
        } else {
            candidates.candidates.par_iter().map(eval_one).collect()
        };

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut failures = candidates.failures.clone();
        for outcome in outcomes {
            match outcome {
                Ok(row) => rows.push(row),
                Err(failure) => failures.push(failure),
            }
        }
        failures.sort_by_key(|f| f.index);

        let outcome = SweepOutcome {
            rows,
            failures,
            elapsed: start.elapsed(),
        };
        info!(
            evaluated = outcome.rows.len(),
            failed = outcome.failures.len(),
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            per_sec = outcome.throughput(),
            "sweep finished"
        );
        Ok(outcome)
    }

    fn evaluate_candidate(&self, candidate: &Candidate) -> Result<SweepRow, CandidateFailure> {
        let combo = &candidate.combination;

        if tracing::enabled!(Level::DEBUG) {
            let resolution = SignalScorer::new().resolve(&self.table, combo);
            if !resolution.is_fully_resolved() {
                debug!(
                    index = candidate.index,
                    unknown = ?resolution.unknown,
                    non_finite = ?resolution.non_finite,
                    "combination has keys that contribute nothing"
                );
            }
        }

        let direction = self.options.direction;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            evaluate_filtered(
                self.evaluator.as_ref(),
                &self.table,
                combo,
                direction,
                self.options.hold_filter.as_ref(),
            )
        }));

        match result {
            Ok(evaluation) => Ok(SweepRow {
                index: candidate.index,
                combination: combo.clone(),
                hash: combo.hash(),
                direction,
                result: evaluation.result,
            }),
            Err(payload) => Err(CandidateFailure {
                index: candidate.index,
                raw: combo.canonical(),
                error: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn progress_step(total: usize, every_pct: usize) -> usize {
    if every_pct == 0 || total == 0 {
        return 0;
    }
    (total * every_pct.min(100) / 100).max(1)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("evaluation panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("evaluation panicked: {s}")
    } else {
        "evaluation panicked".to_string()
    }
}
