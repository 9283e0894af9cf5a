//! Leaderboard — bounded, deduplicated top-N of evaluated combinations.
//!
//! Deduplication key: `ComboHash` (canonical form of the combination). If a
//! combination with the same hash arrives with a better score it replaces
//! the existing entry; otherwise it is skipped. Entries are ordered by the
//! ranking metric (descending), then canonical form, then input index, so
//! output is identical across thread counts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use combolab_core::{ComboHash, EvaluationResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sweep::SweepRow;

/// Metric used to order results. Higher is better for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    #[default]
    Roi,
    Winrate,
    Sharpe,
    NumTrades,
    AvgTrade,
    ProfitFactor,
}

impl RankingMetric {
    pub const ALL: [RankingMetric; 6] = [
        RankingMetric::Roi,
        RankingMetric::Winrate,
        RankingMetric::Sharpe,
        RankingMetric::NumTrades,
        RankingMetric::AvgTrade,
        RankingMetric::ProfitFactor,
    ];

    pub fn extract(self, result: &EvaluationResult) -> f64 {
        match self {
            RankingMetric::Roi => result.roi,
            RankingMetric::Winrate => result.winrate,
            RankingMetric::Sharpe => result.sharpe,
            RankingMetric::NumTrades => result.num_trades as f64,
            RankingMetric::AvgTrade => result.avg_trade,
            RankingMetric::ProfitFactor => result.profit_factor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RankingMetric::Roi => "roi",
            RankingMetric::Winrate => "winrate",
            RankingMetric::Sharpe => "sharpe",
            RankingMetric::NumTrades => "num_trades",
            RankingMetric::AvgTrade => "avg_trade",
            RankingMetric::ProfitFactor => "profit_factor",
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown ranking metric '{0}' (expected roi, winrate, sharpe, num_trades, avg_trade or profit_factor)")]
pub struct RankingMetricParseError(pub String);

impl FromStr for RankingMetric {
    type Err = RankingMetricParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        RankingMetric::ALL
            .into_iter()
            .find(|m| m.as_str() == norm)
            .ok_or_else(|| RankingMetricParseError(s.to_string()))
    }
}

/// Eligibility window applied before ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingFilter {
    pub min_trades: usize,
    pub max_trades: Option<usize>,
    pub min_winrate: f64,
}

impl Default for RankingFilter {
    fn default() -> Self {
        Self {
            min_trades: 1,
            max_trades: None,
            min_winrate: 0.0,
        }
    }
}

impl RankingFilter {
    /// Accept everything, including zero-trade results.
    pub fn permissive() -> Self {
        Self {
            min_trades: 0,
            max_trades: None,
            min_winrate: 0.0,
        }
    }

    pub fn accepts(&self, result: &EvaluationResult) -> bool {
        result.num_trades >= self.min_trades
            && self.max_trades.map_or(true, |max| result.num_trades <= max)
            && result.winrate >= self.min_winrate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub row: SweepRow,
    pub score: f64,
}

/// Outcome of an insert operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// New entry added to the leaderboard.
    Inserted,
    /// Replaced an existing entry with the same hash (better score).
    Replaced,
    /// Skipped: filtered out, non-finite score, duplicate with worse or
    /// equal score, or not better than the current worst.
    Skipped,
}

#[derive(Debug)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
    max_size: usize,
    metric: RankingMetric,
    filter: RankingFilter,
}

impl Leaderboard {
    pub fn new(max_size: usize, metric: RankingMetric, filter: RankingFilter) -> Self {
        Self {
            entries: Vec::with_capacity(max_size.min(1024)),
            max_size,
            metric,
            filter,
        }
    }

    pub fn insert(&mut self, row: SweepRow) -> InsertResult {
        if !self.filter.accepts(&row.result) {
            return InsertResult::Skipped;
        }
        let score = self.metric.extract(&row.result);
        if !score.is_finite() {
            return InsertResult::Skipped;
        }
        let entry = LeaderboardEntry { row, score };

        if let Some(idx) = self.find_by_hash(&entry.row.hash) {
            if compare_entries(&entry, &self.entries[idx]) == Ordering::Less {
                self.entries[idx] = entry;
                self.sort_entries();
                return InsertResult::Replaced;
            }
            return InsertResult::Skipped;
        }

        if self.entries.len() < self.max_size {
            self.entries.push(entry);
            self.sort_entries();
            InsertResult::Inserted
        } else if let Some(worst) = self.entries.last() {
            if compare_entries(&entry, worst) == Ordering::Less {
                self.entries.pop();
                self.entries.push(entry);
                self.sort_entries();
                InsertResult::Inserted
            } else {
                InsertResult::Skipped
            }
        } else {
            InsertResult::Skipped
        }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = SweepRow>) {
        for row in rows {
            self.insert(row);
        }
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn rows(&self) -> impl Iterator<Item = &SweepRow> {
        self.entries.iter().map(|e| &e.row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metric(&self) -> RankingMetric {
        self.metric
    }

    pub fn best(&self) -> Option<&LeaderboardEntry> {
        self.entries.first()
    }

    fn find_by_hash(&self, hash: &ComboHash) -> Option<usize> {
        self.entries.iter().position(|e| e.row.hash == *hash)
    }

    fn sort_entries(&mut self) {
        self.entries.sort_by(compare_entries);
    }
}

/// Best first: higher score, then smaller canonical form, then lower index.
fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.row.combination.canonical().cmp(&b.row.combination.canonical()))
        .then_with(|| a.row.index.cmp(&b.row.index))
}

/// Sort every row by `metric` (best first) without bounding or dedup.
/// Non-finite scores sink to the bottom.
pub fn rank_rows(rows: &[SweepRow], metric: RankingMetric) -> Vec<SweepRow> {
    let mut keyed: Vec<(f64, String, &SweepRow)> = rows
        .iter()
        .map(|r| {
            let s = metric.extract(&r.result);
            let s = if s.is_finite() { s } else { f64::NEG_INFINITY };
            (s, r.combination.canonical(), r)
        })
        .collect();
    keyed.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.index.cmp(&b.2.index))
    });
    keyed.into_iter().map(|(_, _, r)| r.clone()).collect()
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use combolab_core::{Direction, WeightedCombination};

    fn row(index: usize, signal: &str, weight: f64, roi: f64, trades: usize) -> SweepRow {
        let combination = WeightedCombination::new().with(signal, weight);
        SweepRow {
            index,
            hash: combination.hash(),
            combination,
            direction: Direction::Long,
            result: EvaluationResult {
                roi,
                num_trades: trades,
                winrate: 0.5,
                sharpe: roi * 10.0,
                avg_trade: if trades > 0 { roi / trades as f64 } else { 0.0 },
                profit_factor: 1.0,
                max_consecutive_losses: 0,
            },
        }
    }

    fn board(size: usize) -> Leaderboard {
        Leaderboard::new(size, RankingMetric::Roi, RankingFilter::default())
    }

    #[test]
    fn insert_unique_entries() {
        let mut lb = board(10);
        assert_eq!(lb.insert(row(0, "rsi", 1.0, 0.1, 5)), InsertResult::Inserted);
        assert_eq!(lb.insert(row(1, "macd", 1.0, 0.2, 5)), InsertResult::Inserted);
        assert_eq!(lb.insert(row(2, "adx", 1.0, 0.05, 5)), InsertResult::Inserted);
        assert_eq!(lb.len(), 3);
    }

    #[test]
    fn entries_sorted_best_first() {
        let mut lb = board(10);
        lb.insert(row(0, "rsi", 1.0, 0.1, 5));
        lb.insert(row(1, "macd", 1.0, 0.3, 5));
        lb.insert(row(2, "adx", 1.0, 0.2, 5));
        let scores: Vec<f64> = lb.entries().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![0.3, 0.2, 0.1]);
        assert_eq!(lb.best().unwrap().row.index, 1);
    }

    #[test]
    fn dedup_replaces_on_better_score() {
        let mut lb = board(10);
        lb.insert(row(0, "rsi", 1.0, 0.1, 5));
        assert_eq!(lb.insert(row(7, "rsi", 1.0, 0.4, 5)), InsertResult::Replaced);
        assert_eq!(lb.len(), 1);
        assert_eq!(lb.entries()[0].row.index, 7);
    }

    #[test]
    fn dedup_skips_on_worse_score() {
        let mut lb = board(10);
        lb.insert(row(0, "rsi", 1.0, 0.4, 5));
        assert_eq!(lb.insert(row(1, "rsi", 1.0, 0.1, 5)), InsertResult::Skipped);
        assert_eq!(lb.entries()[0].row.index, 0);
    }

    #[test]
    fn bounded_to_max_size() {
        let mut lb = board(2);
        lb.insert(row(0, "rsi", 1.0, 0.1, 5));
        lb.insert(row(1, "macd", 1.0, 0.2, 5));
        assert_eq!(lb.insert(row(2, "adx", 1.0, 0.3, 5)), InsertResult::Inserted);
        assert_eq!(lb.insert(row(3, "cci", 1.0, 0.0, 5)), InsertResult::Skipped);
        let idx: Vec<usize> = lb.rows().map(|r| r.index).collect();
        assert_eq!(idx, vec![2, 1]);
    }

    #[test]
    fn non_finite_score_rejected() {
        let mut lb = board(10);
        assert_eq!(lb.insert(row(0, "rsi", 1.0, f64::NAN, 5)), InsertResult::Skipped);
        assert_eq!(
            lb.insert(row(1, "rsi", 2.0, f64::INFINITY, 5)),
            InsertResult::Skipped
        );
        assert!(lb.is_empty());
    }

    #[test]
    fn filter_excludes_trade_counts_outside_window() {
        let filter = RankingFilter {
            min_trades: 10,
            max_trades: Some(100),
            min_winrate: 0.0,
        };
        let mut lb = Leaderboard::new(10, RankingMetric::Roi, filter);
        assert_eq!(lb.insert(row(0, "rsi", 1.0, 0.5, 5)), InsertResult::Skipped);
        assert_eq!(lb.insert(row(1, "macd", 1.0, 0.5, 500)), InsertResult::Skipped);
        assert_eq!(lb.insert(row(2, "adx", 1.0, 0.5, 50)), InsertResult::Inserted);
    }

    #[test]
    fn zero_trade_rows_skipped_by_default() {
        let mut lb = board(10);
        assert_eq!(lb.insert(row(0, "rsi", 1.0, 0.0, 0)), InsertResult::Skipped);
        let mut open = Leaderboard::new(10, RankingMetric::Roi, RankingFilter::permissive());
        assert_eq!(open.insert(row(0, "rsi", 1.0, 0.0, 0)), InsertResult::Inserted);
    }

    #[test]
    fn ties_break_on_canonical_form() {
        let mut lb = board(10);
        lb.insert(row(0, "macd", 1.0, 0.1, 5));
        lb.insert(row(1, "adx", 1.0, 0.1, 5));
        let first = &lb.entries()[0].row;
        assert!(first.combination.contains("adx"));
    }

    #[test]
    fn metric_parse_and_extract() {
        assert_eq!("ROI".parse::<RankingMetric>().unwrap(), RankingMetric::Roi);
        assert_eq!(
            "num-trades".parse::<RankingMetric>().unwrap(),
            RankingMetric::NumTrades
        );
        assert!("drawdown".parse::<RankingMetric>().is_err());
        let r = row(0, "rsi", 1.0, 0.2, 4).result;
        assert_eq!(RankingMetric::NumTrades.extract(&r), 4.0);
        assert_eq!(RankingMetric::AvgTrade.extract(&r), 0.05);
        for m in RankingMetric::ALL {
            assert_eq!(m.to_string().parse::<RankingMetric>().unwrap(), m);
        }
    }

    #[test]
    fn rank_rows_sorts_all_and_sinks_nan() {
        let rows = vec![
            row(0, "rsi", 1.0, 0.1, 5),
            row(1, "macd", 1.0, f64::NAN, 5),
            row(2, "adx", 1.0, 0.3, 0),
        ];
        let ranked = rank_rows(&rows, RankingMetric::Roi);
        let idx: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(idx, vec![2, 0, 1]);
    }
}
