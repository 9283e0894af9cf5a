//! Candidate generation.
//!
//! Three ways to build a candidate list:
//! 1. `GridSpec::generate` — every K-of-N signal subset crossed with a weight grid
//! 2. `expand_seeds` — grow K-signal seeds to K+1 by adding one missing signal
//! 3. `random_combinations` — seeded random exploration of K-combinations
//!
//! All three are deterministic for fixed inputs (and seed).

use std::collections::HashSet;

use combolab_core::{ComboHash, WeightedCombination};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

/// The twelve signal columns of the standard BTC/USDT 1m dataset.
pub const DEFAULT_SIGNALS: [&str; 12] = [
    "rsi", "macd", "bollinger", "ma200", "stoch", "atr", "ema50", "adx", "cci", "mfi", "obv", "roc",
];

/// Weight grid 0.1, 0.2, ..., 1.0.
pub fn default_weights() -> Vec<f64> {
    (1..=10).map(|i| i as f64 / 10.0).collect()
}

#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    #[error("k must be between 1 and {available} (got {k})")]
    InvalidK { k: usize, available: usize },

    #[error("weight grid is empty")]
    EmptyWeights,

    #[error("weight {0} is not finite")]
    NonFiniteWeight(f64),

    #[error("grid would produce {estimate} combinations (limit {limit})")]
    TooLarge { estimate: u128, limit: u128 },
}

// ─── Grid ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub signals: Vec<String>,
    pub k: usize,
    pub weights: Vec<f64>,
}

impl GridSpec {
    pub fn new(signals: Vec<String>, k: usize, weights: Vec<f64>) -> Self {
        Self { signals, k, weights }
    }

    /// `k`-of-12 over the standard signals and the 0.1 step weight grid.
    pub fn standard(k: usize) -> Self {
        Self::new(
            DEFAULT_SIGNALS.iter().map(|s| s.to_string()).collect(),
            k,
            default_weights(),
        )
    }

    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.k == 0 || self.k > self.signals.len() {
            return Err(GeneratorError::InvalidK {
                k: self.k,
                available: self.signals.len(),
            });
        }
        validate_weights(&self.weights)
    }

    /// Upper bound on the output size: `C(N, K) * |W|^K`. Saturates instead
    /// of overflowing. All-zero vectors are still counted.
    pub fn estimate(&self) -> u128 {
        let subsets = binomial(self.signals.len(), self.k);
        let per_subset = (self.weights.len() as u128).saturating_pow(self.k as u32);
        subsets.saturating_mul(per_subset)
    }

    /// Enumerate the grid in lexicographic subset order, then weight order.
    pub fn generate(&self) -> Result<Vec<WeightedCombination>, GeneratorError> {
        self.validate()?;
        let mut out = Vec::new();
        for subset in subsets(self.signals.len(), self.k) {
            let mut picks = vec![0usize; self.k];
            loop {
                let combo: WeightedCombination = subset
                    .iter()
                    .zip(&picks)
                    .map(|(&s, &w)| (self.signals[s].as_str(), self.weights[w]))
                    .collect();
                if !combo.is_all_zero() {
                    out.push(combo);
                }
                if !advance(&mut picks, self.weights.len()) {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Like [`generate`](Self::generate) but refuses grids above `limit`.
    pub fn generate_bounded(&self, limit: u128) -> Result<Vec<WeightedCombination>, GeneratorError> {
        let estimate = self.estimate();
        if estimate > limit {
            return Err(GeneratorError::TooLarge { estimate, limit });
        }
        self.generate()
    }
}

// ─── Seed expansion ──────────────────────────────────────────────────

/// Grow each seed by one signal from `universe` it does not already use.
///
/// Signals are tried in universe order, at most `max_per_seed` children per
/// seed. Children that collide (same canonical form) with an earlier child
/// are dropped.
pub fn expand_seeds(
    seeds: &[WeightedCombination],
    universe: &[String],
    new_weight: f64,
    max_per_seed: usize,
) -> Result<Vec<WeightedCombination>, GeneratorError> {
    validate_weights(&[new_weight])?;
    let mut seen: HashSet<ComboHash> = HashSet::new();
    let mut out = Vec::new();

    for seed in seeds {
        let mut added = 0;
        for name in universe {
            if added >= max_per_seed {
                break;
            }
            if seed.contains(name) {
                continue;
            }
            let child = seed.clone().with(name.clone(), new_weight);
            added += 1;
            if seen.insert(child.hash()) {
                out.push(child);
            }
        }
    }
    Ok(out)
}

// ─── Random exploration ──────────────────────────────────────────────

/// Draw up to `count` unique K-combinations with weights from `weights`.
///
/// Gives up after `count * 20` attempts, so a small space returns fewer
/// than `count` combinations rather than looping forever.
pub fn random_combinations(
    universe: &[String],
    k: usize,
    weights: &[f64],
    count: usize,
    seed: u64,
) -> Result<Vec<WeightedCombination>, GeneratorError> {
    if k == 0 || k > universe.len() {
        return Err(GeneratorError::InvalidK {
            k,
            available: universe.len(),
        });
    }
    validate_weights(weights)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen: HashSet<ComboHash> = HashSet::new();
    let mut out = Vec::with_capacity(count);
    let max_attempts = count.saturating_mul(20);

    let mut attempts = 0;
    while out.len() < count && attempts < max_attempts {
        attempts += 1;
        let picked: Vec<&String> = universe.choose_multiple(&mut rng, k).collect();
        let combo: WeightedCombination = picked
            .into_iter()
            .map(|name| {
                // `weights` is non-empty, checked above.
                let w = weights.choose(&mut rng).copied().unwrap_or(0.0);
                (name.as_str(), w)
            })
            .collect();
        if combo.is_all_zero() {
            continue;
        }
        if seen.insert(combo.hash()) {
            out.push(combo);
        }
    }
    Ok(out)
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn validate_weights(weights: &[f64]) -> Result<(), GeneratorError> {
    if weights.is_empty() {
        return Err(GeneratorError::EmptyWeights);
    }
    if let Some(&w) = weights.iter().find(|w| !w.is_finite()) {
        return Err(GeneratorError::NonFiniteWeight(w));
    }
    Ok(())
}

pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // Exact at every step: acc * (n - i) is divisible by (i + 1).
        acc = acc.saturating_mul((n - i) as u128) / (i as u128 + 1);
    }
    acc
}

/// Lexicographic k-subsets of `0..n`.
fn subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let Some(pos) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            break;
        };
        idx[pos] += 1;
        for j in pos + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
    out
}

/// Odometer increment over base `radix`. Returns false after the last state.
fn advance(digits: &mut [usize], radix: usize) -> bool {
    for d in digits.iter_mut().rev() {
        *d += 1;
        if *d < radix {
            return true;
        }
        *d = 0;
    }
    false
}
