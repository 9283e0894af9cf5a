//! WeightedCombination — one candidate strategy: signal name → weight.
//!
//! Backed by a `BTreeMap` so iteration order, and therefore the order of the
//! floating-point summation in the scorer, is fixed by the key set alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CombinationError {
    #[error("combination is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("combination must be an object of name → weight, got {0}")]
    NotAnObject(String),

    #[error("weight for '{key}' is not a number: {value}")]
    NonNumericWeight { key: String, value: String },
}

/// Content hash of a combination's canonical form (BLAKE3 hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComboHash(pub String);

impl fmt::Display for ComboHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightedCombination(BTreeMap<String, f64>);

impl WeightedCombination {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.0.insert(name.into(), weight);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, weight: f64) -> Option<f64> {
        self.0.insert(name.into(), weight)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of signals in the combination.
    pub fn k(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, w)| (k.as_str(), *w))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// True when every weight is zero (or non-finite), i.e. the score is
    /// identically zero regardless of the table.
    pub fn is_all_zero(&self) -> bool {
        self.0.values().all(|w| !w.is_finite() || *w == 0.0)
    }

    /// Canonical JSON: keys sorted, no whitespace.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }

    pub fn hash(&self) -> ComboHash {
        ComboHash(blake3::hash(self.canonical().as_bytes()).to_hex().to_string())
    }

    /// Parse a JSON object or a Python dict literal (`{'rsi': 0.5}`).
    ///
    /// Integer weights are accepted and widened to `f64`.
    pub fn parse(text: &str) -> Result<Self, CombinationError> {
        let value: serde_json::Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(first) => {
                let swapped = text.trim().replace('\'', "\"");
                serde_json::from_str(&swapped).map_err(|_| first)?
            }
        };

        let obj = match value {
            serde_json::Value::Object(map) => map,
            other => return Err(CombinationError::NotAnObject(other.to_string())),
        };

        let mut combo = Self::new();
        for (key, v) in obj {
            let weight = v
                .as_f64()
                .ok_or_else(|| CombinationError::NonNumericWeight {
                    key: key.clone(),
                    value: v.to_string(),
                })?;
            combo.insert(key, weight);
        }
        Ok(combo)
    }
}

impl fmt::Display for WeightedCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for WeightedCombination {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, w)| (k.into(), w)).collect())
    }
}
