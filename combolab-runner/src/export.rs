//! CSV export and output-file handling.
//!
//! - **Results**: one row per evaluated combination, flat columns
//! - **Errors**: candidates that failed to parse or evaluate
//! - **Trades**: the trade tape of a single evaluation, with hold times
//! - **Candidates**: generated combinations in the candidate-file format
//!
//! Existing output files are moved aside to `<stem>_backup_<timestamp>.<ext>`
//! before being overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use combolab_core::{Direction, EvaluationResult, PriceTable, Trade, WeightedCombination};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::candidates::{CandidateFailure, COMBINATION_COLUMN};
use crate::sweep::SweepRow;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flat results row; column order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub index: usize,
    #[serde(rename = "Combination")]
    pub combination: String,
    pub k: usize,
    pub direction: Direction,
    pub roi: f64,
    pub num_trades: usize,
    pub winrate: f64,
    pub sharpe: f64,
    pub avg_trade: f64,
    pub profit_factor: f64,
    pub combo_hash: String,
}

impl From<&SweepRow> for ResultRecord {
    fn from(row: &SweepRow) -> Self {
        Self {
            index: row.index,
            combination: row.combination.canonical(),
            k: row.combination.k(),
            direction: row.direction,
            roi: row.result.roi,
            num_trades: row.result.num_trades,
            winrate: row.result.winrate,
            sharpe: row.result.sharpe,
            avg_trade: row.result.avg_trade,
            profit_factor: row.result.profit_factor,
            combo_hash: row.hash.to_string(),
        }
    }
}

impl ResultRecord {
    /// Metrics view of the row. The loss streak is not stored in the CSV.
    pub fn result(&self) -> EvaluationResult {
        EvaluationResult {
            roi: self.roi,
            num_trades: self.num_trades,
            winrate: self.winrate,
            sharpe: self.sharpe,
            avg_trade: self.avg_trade,
            profit_factor: self.profit_factor,
            max_consecutive_losses: 0,
        }
    }
}

// ─── CSV export ─────────────────────────────────────────────────────

pub fn results_csv<'a>(rows: impl IntoIterator<Item = &'a SweepRow>) -> Result<String> {
    let records: Vec<ResultRecord> = rows.into_iter().map(ResultRecord::from).collect();
    records_csv(&records)
}

pub fn records_csv(records: &[ResultRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for r in records {
        wtr.serialize(r).context("failed to serialize result row")?;
    }
    // A header-only file for an empty batch.
    if records.is_empty() {
        wtr.write_record(RESULT_COLUMNS)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub const RESULT_COLUMNS: [&str; 11] = [
    "index",
    "Combination",
    "k",
    "direction",
    "roi",
    "num_trades",
    "winrate",
    "sharpe",
    "avg_trade",
    "profit_factor",
    "combo_hash",
];

/// Columns: index, Combination, error
pub fn failures_csv(failures: &[CandidateFailure]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["index", COMBINATION_COLUMN, "error"])?;
    for f in failures {
        wtr.write_record([&f.index.to_string(), &f.raw, &f.error])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a trade tape. Time and hold-minute columns are empty when the
/// table has no timestamps.
///
/// Columns: side, entry_index, entry_time, entry_price, exit_index,
/// exit_time, exit_price, exit_reason, gross_return, return, bars_held,
/// hold_minutes
pub fn trades_csv(trades: &[Trade], table: &PriceTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_index",
        "entry_time",
        "entry_price",
        "exit_index",
        "exit_time",
        "exit_price",
        "exit_reason",
        "gross_return",
        "return",
        "bars_held",
        "hold_minutes",
    ])?;

    let time_at = |i: usize| -> String {
        table
            .timestamps()
            .and_then(|ts| ts.get(i))
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default()
    };

    for t in trades {
        wtr.write_record([
            &t.side.to_string(),
            &t.entry_index.to_string(),
            &time_at(t.entry_index),
            &format!("{:.6}", t.entry_price),
            &t.exit_index.to_string(),
            &time_at(t.exit_index),
            &format!("{:.6}", t.exit_price),
            &t.exit_reason.to_string(),
            &format!("{:.8}", t.gross_return),
            &format!("{:.8}", t.net_return),
            &t.bars_held().to_string(),
            &table
                .hold_minutes(t)
                .map(|m| format!("{m:.1}"))
                .unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Generated combinations, one per row, readable by `load_candidates`.
pub fn candidates_csv(combos: &[WeightedCombination]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([COMBINATION_COLUMN])?;
    for c in combos {
        wtr.write_record([c.canonical()])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn read_results_csv(path: &Path) -> Result<Vec<ResultRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open results file {}", path.display()))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, rec)| rec.with_context(|| format!("bad results row {} in {}", i + 1, path.display())))
        .collect()
}

// ─── Output files ───────────────────────────────────────────────────

/// Move `path` aside if it exists. Returns the backup location.
pub fn backup_existing(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut backup = path.with_file_name(format!("{stem}_backup_{stamp}{ext}"));
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{stem}_backup_{stamp}_{n}{ext}"));
        n += 1;
    }

    fs::rename(path, &backup).with_context(|| {
        format!("failed to back up {} to {}", path.display(), backup.display())
    })?;
    info!(from = %path.display(), to = %backup.display(), "backed up existing output");
    Ok(Some(backup))
}

/// Write `contents` to `path`, creating parent directories and optionally
/// backing up an existing file first.
pub fn write_output(path: &Path, contents: &str, backup: bool) -> Result<Option<PathBuf>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let moved = if backup { backup_existing(path)? } else { None };
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(moved)
}

// ─── Tests ──────────────────────────────────────────────────────────
