//! Post-sweep summary of a results file.
//!
//! Zero-trade rows are dropped first; everything below is computed over
//! the rows that actually traded.

use std::path::{Path, PathBuf};

use anyhow::Result;
use combolab_core::metrics::mean_f64;
use serde::{Deserialize, Serialize};

use crate::export::{records_csv, write_output, ResultRecord};
use crate::leaderboard::RankingMetric;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustCriteria {
    pub min_trades: usize,
    pub min_winrate: f64,
}

impl Default for RobustCriteria {
    fn default() -> Self {
        Self {
            min_trades: 100,
            min_winrate: 0.5,
        }
    }
}

impl RobustCriteria {
    pub fn accepts(&self, r: &ResultRecord) -> bool {
        r.num_trades >= self.min_trades && r.winrate >= self.min_winrate
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub roi_mean: f64,
    pub roi_median: f64,
    /// Sample standard deviation (n - 1).
    pub roi_std: f64,
    pub winrate_mean: f64,
    pub trades_mean: f64,
    pub trades_median: f64,
    pub best_roi: f64,
}

impl SummaryStats {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let roi: Vec<f64> = records.iter().map(|r| r.roi).collect();
        let trades: Vec<f64> = records.iter().map(|r| r.num_trades as f64).collect();
        let winrate: Vec<f64> = records.iter().map(|r| r.winrate).collect();

        Self {
            count: records.len(),
            roi_mean: mean_f64(&roi),
            roi_median: median(&roi),
            roi_std: sample_std(&roi),
            winrate_mean: mean_f64(&winrate),
            trades_mean: mean_f64(&trades),
            trades_median: median(&trades),
            best_roi: roi.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub metric: RankingMetric,
    /// Rows dropped because they never traded.
    pub dropped_zero_trade: usize,
    pub stats: SummaryStats,
    /// Every traded row, best first.
    pub ranked: Vec<ResultRecord>,
    pub robust: Vec<ResultRecord>,
    pub top: Vec<ResultRecord>,
}

pub fn summarize(
    records: &[ResultRecord],
    metric: RankingMetric,
    criteria: RobustCriteria,
    top_n: usize,
) -> Summary {
    let traded: Vec<ResultRecord> = records
        .iter()
        .filter(|r| r.num_trades > 0)
        .cloned()
        .collect();
    let dropped_zero_trade = records.len() - traded.len();
    let stats = SummaryStats::from_records(&traded);

    let mut ranked = traded;
    ranked.sort_by(|a, b| {
        let sa = finite_or_min(metric.extract(&a.result()));
        let sb = finite_or_min(metric.extract(&b.result()));
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.combination.cmp(&b.combination))
            .then_with(|| a.index.cmp(&b.index))
    });

    let robust: Vec<ResultRecord> = ranked.iter().filter(|r| criteria.accepts(r)).cloned().collect();
    let top: Vec<ResultRecord> = ranked.iter().take(top_n).cloned().collect();

    Summary {
        metric,
        dropped_zero_trade,
        stats,
        ranked,
        robust,
        top,
    }
}

pub fn summary_text(summary: &Summary, criteria: &RobustCriteria) -> String {
    let s = &summary.stats;
    let best = if s.count > 0 { s.best_roi } else { 0.0 };
    let mut report = String::new();

    report.push_str("=== Strategy Summary ===\n");
    report.push_str(&format!(
        "Strategies:     {} ({} zero-trade dropped)\n",
        s.count, summary.dropped_zero_trade
    ));
    report.push_str(&format!("Ranked by:      {}\n\n", summary.metric));

    report.push_str("--- ROI ---\n");
    report.push_str(&format!("Mean:           {:.4}\n", s.roi_mean));
    report.push_str(&format!("Median:         {:.4}\n", s.roi_median));
    report.push_str(&format!("Std dev:        {:.4}\n", s.roi_std));
    report.push_str(&format!("Best:           {:.4}\n\n", best));

    report.push_str("--- Trades ---\n");
    report.push_str(&format!("Mean trades:    {:.1}\n", s.trades_mean));
    report.push_str(&format!("Median trades:  {:.1}\n", s.trades_median));
    report.push_str(&format!("Mean win rate:  {:.1}%\n\n", s.winrate_mean * 100.0));

    report.push_str(&format!(
        "--- Robust (trades >= {}, win rate >= {:.0}%) ---\n",
        criteria.min_trades,
        criteria.min_winrate * 100.0
    ));
    report.push_str(&format!("Count:          {}\n\n", summary.robust.len()));

    report.push_str(&format!("--- Top {} ---\n", summary.top.len()));
    report.push_str(&format!(
        "{:<5} {:>10} {:>8} {:>8} {:>8}  {}\n",
        "#", "roi", "trades", "winrate", "sharpe", "combination"
    ));
    for (i, r) in summary.top.iter().enumerate() {
        report.push_str(&format!(
            "{:<5} {:>10.4} {:>8} {:>7.1}% {:>8.3}  {}\n",
            i + 1,
            r.roi,
            r.num_trades,
            r.winrate * 100.0,
            r.sharpe,
            r.combination
        ));
    }
    report
}

/// Write `ranked.csv`, `robust.csv`, `top.csv` and `summary.txt` to `dir`.
pub fn write_summary(
    summary: &Summary,
    criteria: &RobustCriteria,
    dir: &Path,
    backup: bool,
) -> Result<Vec<PathBuf>> {
    let files = [
        ("ranked.csv", records_csv(&summary.ranked)?),
        ("robust.csv", records_csv(&summary.robust)?),
        ("top.csv", records_csv(&summary.top)?),
        ("summary.txt", summary_text(summary, criteria)),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        write_output(&path, &contents, backup)?;
        written.push(path);
    }
    Ok(written)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn finite_or_min(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        f64::NEG_INFINITY
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
