//! SignalScorer — weighted sum of signal columns into one score series.
//!
//! `score[i] = Σ weight_k * signal_k[i]`, summed in the combination's key
//! order. Keys the table does not know contribute nothing, as do non-finite
//! weights. The result never contains NaN or Inf.

use crate::domain::WeightedCombination;
use crate::table::PriceTable;

/// Which combination keys resolved against a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyResolution {
    pub matched: Vec<String>,
    pub unknown: Vec<String>,
    /// Keys with a NaN or infinite weight; skipped like unknown keys.
    pub non_finite: Vec<String>,
}

impl KeyResolution {
    pub fn is_fully_resolved(&self) -> bool {
        self.unknown.is_empty() && self.non_finite.is_empty()
    }
}

/// Stateless; one value can be shared by every worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalScorer;

impl SignalScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, table: &PriceTable, combination: &WeightedCombination) -> Vec<f64> {
        let mut acc = vec![0.0_f64; table.len()];

        for (key, weight) in combination.iter() {
            if !weight.is_finite() || weight == 0.0 {
                continue;
            }
            let Some(values) = table.signal(key) else {
                continue;
            };
            for (a, v) in acc.iter_mut().zip(values) {
                *a += weight * v;
            }
        }

        for a in acc.iter_mut() {
            if !a.is_finite() {
                *a = 0.0;
            }
        }
        acc
    }

    pub fn resolve(&self, table: &PriceTable, combination: &WeightedCombination) -> KeyResolution {
        let mut res = KeyResolution::default();
        for (key, weight) in combination.iter() {
            if !weight.is_finite() {
                res.non_finite.push(key.to_string());
            } else if table.signal(key).is_some() {
                res.matched.push(key.to_string());
            } else {
                res.unknown.push(key.to_string());
            }
        }
        res
    }
}
