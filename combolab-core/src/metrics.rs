//! Trade metrics — pure functions from a trade list to scalars.
//!
//! Every output is finite. Anything that would divide by zero or produce
//! NaN/Inf is reported as 0.0 instead, because results feed straight into
//! numeric sorting and filtering.

use serde::{Deserialize, Serialize};

use crate::domain::Trade;

/// Minutes per year, for annualizing a per-trade Sharpe on 1-minute data.
pub const MINUTES_PER_YEAR: f64 = 252.0 * 24.0 * 60.0;

/// How trade returns combine into ROI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMode {
    /// Arithmetic sum of trade returns.
    #[default]
    Summed,
    /// `Π(1 + r) - 1`.
    Compounded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub roi_mode: RoiMode,
    /// When set, Sharpe is multiplied by `sqrt(periods_per_year)`.
    pub sharpe_periods_per_year: Option<f64>,
}

/// Aggregate record for one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub roi: f64,
    pub num_trades: usize,
    pub winrate: f64,
    pub sharpe: f64,
    pub avg_trade: f64,
    pub profit_factor: f64,
    pub max_consecutive_losses: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAggregator {
    config: MetricsConfig,
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn aggregate(&self, trades: &[Trade]) -> EvaluationResult {
        let returns: Vec<f64> = trades.iter().map(|t| finite(t.net_return)).collect();
        let n = returns.len();
        let roi = match self.config.roi_mode {
            RoiMode::Summed => summed_roi(&returns),
            RoiMode::Compounded => compounded_roi(&returns),
        };
        let mut sharpe = sharpe_ratio(&returns);
        if let Some(periods) = self.config.sharpe_periods_per_year {
            if periods.is_finite() && periods > 0.0 {
                sharpe *= periods.sqrt();
            }
        }

        EvaluationResult {
            roi: finite(roi),
            num_trades: n,
            winrate: finite(win_rate(&returns)),
            sharpe: finite(sharpe),
            avg_trade: if n == 0 { 0.0 } else { finite(roi / n as f64) },
            profit_factor: finite(profit_factor(&returns)),
            max_consecutive_losses: max_consecutive_losses(&returns),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

fn finite(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub fn summed_roi(returns: &[f64]) -> f64 {
    returns.iter().sum()
}

pub fn compounded_roi(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Fraction of returns strictly above zero.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// Mean over population standard deviation of per-trade returns.
///
/// Returns 0.0 for fewer than two trades or a deviation at or below 1e-12.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = population_std(returns);
    if sd <= 1e-12 {
        return 0.0;
    }
    mean_f64(returns) / sd
}

/// Gross wins over gross losses, capped at 100.0.
pub fn profit_factor(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();

    if gross_loss < 1e-12 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

pub fn max_consecutive_losses(returns: &[f64]) -> usize {
    let mut max_streak = 0;
    let mut streak = 0;
    for r in returns {
        if *r <= 0.0 {
            streak += 1;
            max_streak = max_streak.max(streak);
        } else {
            streak = 0;
        }
    }
    max_streak
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, Side};

    fn trade(ret: f64) -> Trade {
        Trade {
            side: Side::Long,
            entry_index: 0,
            entry_price: 100.0,
            exit_index: 1,
            exit_price: 100.0 * (1.0 + ret),
            exit_reason: ExitReason::ScoreExit,
            gross_return: ret,
            net_return: ret,
        }
    }

    fn trades(rets: &[f64]) -> Vec<Trade> {
        rets.iter().map(|r| trade(*r)).collect()
    }

    #[test]
    fn empty_trade_list_is_all_zero() {
        let r = MetricsAggregator::default().aggregate(&[]);
        assert_eq!(r, EvaluationResult::default());
    }

    #[test]
    fn summed_roi_and_avg_trade() {
        let r = MetricsAggregator::default().aggregate(&trades(&[0.02, -0.01, 0.03]));
        assert!((r.roi - 0.04).abs() < 1e-12);
        assert_eq!(r.num_trades, 3);
        assert!((r.avg_trade - 0.04 / 3.0).abs() < 1e-12);
        assert!((r.winrate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn compounded_roi() {
        let agg = MetricsAggregator::new(MetricsConfig {
            roi_mode: RoiMode::Compounded,
            ..Default::default()
        });
        let r = agg.aggregate(&trades(&[0.10, 0.10]));
        assert!((r.roi - 0.21).abs() < 1e-12);
        assert!((r.avg_trade - 0.105).abs() < 1e-12);
    }

    #[test]
    fn zero_return_is_not_a_win() {
        let r = MetricsAggregator::default().aggregate(&trades(&[0.0, 0.01]));
        assert_eq!(r.winrate, 0.5);
    }

    #[test]
    fn sharpe_uses_population_std() {
        // mean 0.01, population std 0.02
        let r = MetricsAggregator::default().aggregate(&trades(&[0.03, -0.01]));
        assert!((r.sharpe - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sharpe_zero_for_single_trade_or_flat_returns() {
        let agg = MetricsAggregator::default();
        assert_eq!(agg.aggregate(&trades(&[0.05])).sharpe, 0.0);
        assert_eq!(agg.aggregate(&trades(&[0.01, 0.01, 0.01])).sharpe, 0.0);
    }

    #[test]
    fn sharpe_annualization() {
        let agg = MetricsAggregator::new(MetricsConfig {
            sharpe_periods_per_year: Some(4.0),
            ..Default::default()
        });
        let r = agg.aggregate(&trades(&[0.03, -0.01]));
        assert!((r.sharpe - 1.0).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_cases() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[0.01, 0.02]), 100.0);
        assert_eq!(profit_factor(&[-0.01]), 0.0);
        assert!((profit_factor(&[0.03, -0.01]) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn consecutive_losses_streak() {
        assert_eq!(max_consecutive_losses(&[0.1, -0.1, -0.2, 0.1, -0.1]), 2);
        assert_eq!(max_consecutive_losses(&[]), 0);
    }

    #[test]
    fn non_finite_returns_are_coerced() {
        let r = MetricsAggregator::default().aggregate(&trades(&[f64::NAN, f64::INFINITY, 0.01]));
        assert!(r.roi.is_finite());
        assert!(r.sharpe.is_finite());
        assert!(r.avg_trade.is_finite());
        assert!((r.roi - 0.01).abs() < 1e-12);
    }

    #[test]
    fn overflowing_compounded_roi_is_coerced() {
        let agg = MetricsAggregator::new(MetricsConfig {
            roi_mode: RoiMode::Compounded,
            ..Default::default()
        });
        let r = agg.aggregate(&trades(&vec![1e300; 4]));
        assert_eq!(r.roi, 0.0);
        assert_eq!(r.avg_trade, 0.0);
    }
}
