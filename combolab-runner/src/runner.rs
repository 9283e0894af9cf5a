//! Research runner — wires together loading, evaluation, ranking and export.
//!
//! Entry points:
//! - `evaluate_single()`: one combination against the configured table. Used by `combolab evaluate`.
//! - `run_sweep()`: a candidate set against an already-loaded table.
//! - `run_research()`: loads table and candidates from disk, then `run_sweep()`.
//! - `write_report()`: results, errors and leaderboard CSVs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use combolab_core::{
    Backtester, Direction, Evaluation, Evaluator, PriceTable, Side, WeightedCombination,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::candidates::{load_candidates, CandidateError, CandidateSet};
use crate::config::{ConfigError, OutputConfig, ResearchConfig};
use crate::data_loader::{load_table, LoadError, LoadOptions, LoadedTable};
use crate::export::{failures_csv, results_csv, write_output};
use crate::leaderboard::{rank_rows, Leaderboard};
use crate::sweep::{evaluate_filtered, Sweep, SweepError, SweepOptions, SweepOutcome, SweepRow};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("candidate error: {0}")]
    Candidates(#[from] CandidateError),
    #[error("sweep error: {0}")]
    Sweep(#[from] SweepError),
    #[error("regime column '{0}' not found in price table")]
    MissingRegimeColumn(String),
}

/// Build the evaluator for a loaded table, attaching per-side regime gates
/// if a regime column is configured. The table must already carry it
/// (see [`PriceTable::with_regime_column`]).
pub fn build_backtester(config: &ResearchConfig, table: &PriceTable) -> Result<Backtester, RunError> {
    let bt = Backtester::new(config.simulation, config.metrics);
    let Some(column) = config.data.regime_column.as_deref() else {
        return Ok(bt);
    };
    let gates = table
        .regime_gates(config.data.regime_mode)
        .ok_or_else(|| RunError::MissingRegimeColumn(column.to_string()))?;
    info!(
        column,
        mode = ?config.data.regime_mode,
        long_open_pct = gates.for_side(Side::Long).open_fraction() * 100.0,
        short_open_pct = gates.for_side(Side::Short).open_fraction() * 100.0,
        "regime gates attached"
    );
    Ok(bt.with_gates(Arc::new(gates)))
}

pub fn load_configured_table(config: &ResearchConfig) -> Result<LoadedTable, RunError> {
    Ok(load_table(&config.data.path, &LoadOptions::from(&config.data))?)
}

// ─── Single evaluation ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SingleRun {
    pub combination: WeightedCombination,
    pub direction: Direction,
    pub evaluation: Evaluation,
    pub dataset_hash: String,
    pub table: Arc<PriceTable>,
}

pub fn evaluate_single(
    config: &ResearchConfig,
    combination: WeightedCombination,
    direction: Direction,
) -> Result<SingleRun, RunError> {
    let loaded = load_configured_table(config)?;
    let backtester = build_backtester(config, &loaded.table)?;
    let evaluation = evaluate_filtered(
        &backtester,
        &loaded.table,
        &combination,
        direction,
        config.sweep.hold_filter().as_ref(),
    );
    info!(
        combination = %combination,
        %direction,
        trades = evaluation.result.num_trades,
        roi = evaluation.result.roi,
        "evaluated"
    );
    Ok(SingleRun {
        combination,
        direction,
        evaluation,
        dataset_hash: loaded.dataset_hash,
        table: Arc::new(loaded.table),
    })
}

// ─── Sweep ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ResearchReport {
    pub outcome: SweepOutcome,
    /// Every evaluated row, best first by the ranking metric.
    pub ranked: Vec<SweepRow>,
    pub leaderboard: Leaderboard,
    pub dataset_hash: String,
    pub bar_count: usize,
}

pub fn sweep_options(config: &ResearchConfig) -> SweepOptions {
    SweepOptions {
        direction: config.sweep.direction,
        threads: config.sweep.threads,
        hold_filter: config.sweep.hold_filter(),
        parallel: true,
        progress_every_pct: config.sweep.progress_every_pct,
    }
}

pub fn run_sweep(
    config: &ResearchConfig,
    loaded: LoadedTable,
    candidates: &CandidateSet,
) -> Result<ResearchReport, RunError> {
    let evaluator: Arc<dyn Evaluator> = Arc::new(build_backtester(config, &loaded.table)?);
    let bar_count = loaded.table.len();
    let sweep = Sweep::new(evaluator, Arc::new(loaded.table), sweep_options(config));
    let outcome = sweep.run(candidates)?;

    if !outcome.failures.is_empty() {
        warn!(failed = outcome.failures.len(), "some candidates could not be evaluated");
    }

    let ranking = &config.ranking;
    let ranked = rank_rows(&outcome.rows, ranking.sort_by);
    let mut leaderboard = Leaderboard::new(ranking.top_n, ranking.sort_by, ranking.filter());
    leaderboard.extend(outcome.rows.iter().cloned());

    if let Some(best) = leaderboard.best() {
        info!(
            metric = %ranking.sort_by,
            score = best.score,
            combination = %best.row.combination,
            "best candidate"
        );
    }

    Ok(ResearchReport {
        outcome,
        ranked,
        leaderboard,
        dataset_hash: loaded.dataset_hash,
        bar_count,
    })
}

pub fn run_research(config: &ResearchConfig, candidates_path: &Path) -> Result<ResearchReport, RunError> {
    let candidates = load_candidates(candidates_path)?;
    info!(
        path = %candidates_path.display(),
        parsed = candidates.candidates.len(),
        malformed = candidates.failures.len(),
        "loaded candidates"
    );
    let loaded = load_configured_table(config)?;
    run_sweep(config, loaded, &candidates)
}

/// Write results (ranked), errors and leaderboard CSVs. Returns the paths
/// written, in that order.
pub fn write_report(report: &ResearchReport, output: &OutputConfig) -> anyhow::Result<Vec<PathBuf>> {
    let results = output.results_path();
    let errors = output.errors_path();
    let board = output.leaderboard_path();

    write_output(&results, &results_csv(&report.ranked)?, output.backup_existing)
        .with_context(|| format!("writing {}", results.display()))?;
    write_output(&errors, &failures_csv(&report.outcome.failures)?, output.backup_existing)
        .with_context(|| format!("writing {}", errors.display()))?;
    write_output(&board, &results_csv(report.leaderboard.rows())?, output.backup_existing)
        .with_context(|| format!("writing {}", board.display()))?;

    info!(
        results = %results.display(),
        errors = %errors.display(),
        leaderboard = %board.display(),
        "wrote report"
    );
    Ok(vec![results, errors, board])
}
