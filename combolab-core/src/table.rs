//! PriceTable — the prepared, read-only price and signal table.
//!
//! A table is built once per worker and then shared by reference across every
//! candidate evaluation. All normalization happens here, at construction:
//! non-finite values become 0.0 and signal columns are mapped onto the table's
//! [`SignalConvention`]. Nothing downstream mutates it.
//!
//! Signal naming: a column `<name>_signal` registers signal `<name>`; any other
//! non-price column registers itself under its own name. When both `rsi` and
//! `rsi_signal` exist, `rsi_signal` wins.
//!
//! A column promoted with [`PriceTable::with_regime_column`] leaves the signal
//! map: it gates entries and can no longer be scored.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::{PriceBar, Trade};
use crate::simulator::{RegimeMode, SideGates};

/// Columns that are never treated as signals.
pub const RESERVED_COLUMNS: &[&str] = &[
    "open",
    "high",
    "low",
    "close",
    "volume",
    "open_time",
    "close_time",
    "timestamp",
    "time",
];

const SIGNAL_SUFFIX: &str = "_signal";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("price table has no 'close' column")]
    MissingClose,

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("regime column '{0}' not found in price table")]
    MissingRegime(String),
}

/// How signal values are represented in this table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalConvention {
    /// Values snapped to {-1, 0, +1} by sign.
    #[default]
    Discrete,
    /// Finite values kept as-is (z-scores, [-1, 1] oscillators).
    Continuous,
}

impl SignalConvention {
    pub fn normalize(self, v: f64) -> f64 {
        if !v.is_finite() {
            return 0.0;
        }
        match self {
            Self::Continuous => v,
            Self::Discrete => {
                if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceTable {
    close: Vec<f64>,
    high: Option<Vec<f64>>,
    low: Option<Vec<f64>>,
    timestamps: Option<Vec<NaiveDateTime>>,
    signals: BTreeMap<String, Vec<f64>>,
    /// Signals registered from a `_signal` column; a raw column may not replace them.
    suffixed: BTreeSet<String>,
    /// Entry-gate column, kept out of `signals`.
    regime: Option<(String, Vec<f64>)>,
    convention: SignalConvention,
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

impl PriceTable {
    /// A table with only closes. Non-finite closes become 0.0.
    pub fn new(close: Vec<f64>, convention: SignalConvention) -> Self {
        Self {
            close: close.into_iter().map(finite_or_zero).collect(),
            high: None,
            low: None,
            timestamps: None,
            signals: BTreeMap::new(),
            suffixed: BTreeSet::new(),
            regime: None,
            convention,
        }
    }

    /// Build from named numeric columns. Names are matched case-insensitively.
    ///
    /// Fails only when `close` is absent or a column's length disagrees with it.
    pub fn from_columns(
        columns: BTreeMap<String, Vec<f64>>,
        convention: SignalConvention,
    ) -> Result<Self, TableError> {
        let mut columns: BTreeMap<String, Vec<f64>> = columns
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v))
            .collect();

        let close = columns.remove("close").ok_or(TableError::MissingClose)?;
        let mut table = Self::new(close, convention);

        if let (Some(high), Some(low)) = (columns.remove("high"), columns.remove("low")) {
            table = table.with_high_low(high, low)?;
        }

        for (name, values) in columns {
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            table = table.with_signal(&name, values)?;
        }
        Ok(table)
    }

    pub fn with_high_low(mut self, high: Vec<f64>, low: Vec<f64>) -> Result<Self, TableError> {
        self.check_len("high", high.len())?;
        self.check_len("low", low.len())?;
        self.high = Some(high);
        self.low = Some(low);
        Ok(self)
    }

    pub fn with_timestamps(mut self, timestamps: Vec<NaiveDateTime>) -> Result<Self, TableError> {
        self.check_len("timestamp", timestamps.len())?;
        self.timestamps = Some(timestamps);
        Ok(self)
    }

    /// Register a signal column under the naming rule described in the module docs.
    pub fn with_signal(mut self, column: &str, values: Vec<f64>) -> Result<Self, TableError> {
        self.check_len(column, values.len())?;
        let column = column.trim().to_ascii_lowercase();
        let normalized: Vec<f64> = values
            .into_iter()
            .map(|v| self.convention.normalize(v))
            .collect();

        match column.strip_suffix(SIGNAL_SUFFIX) {
            Some(name) if !name.is_empty() => {
                self.suffixed.insert(name.to_string());
                self.signals.insert(name.to_string(), normalized);
            }
            _ => {
                if !self.suffixed.contains(&column) {
                    self.signals.insert(column, normalized);
                }
            }
        }
        Ok(self)
    }

    /// Move a signal column into the regime slot. Accepts `name` or `name_signal`.
    pub fn with_regime_column(mut self, key: &str) -> Result<Self, TableError> {
        let key = key.trim().to_ascii_lowercase();
        let name = if self.signals.contains_key(&key) {
            key.clone()
        } else {
            match key.strip_suffix(SIGNAL_SUFFIX) {
                Some(base) if self.signals.contains_key(base) => base.to_string(),
                _ => return Err(TableError::MissingRegime(key)),
            }
        };
        let values = self
            .signals
            .remove(&name)
            .ok_or_else(|| TableError::MissingRegime(key.clone()))?;
        self.suffixed.remove(&name);
        self.regime = Some((name, values));
        Ok(self)
    }

    fn check_len(&self, column: &str, actual: usize) -> Result<(), TableError> {
        if actual != self.close.len() {
            return Err(TableError::LengthMismatch {
                column: column.to_string(),
                expected: self.close.len(),
                actual,
            });
        }
        Ok(())
    }

    // ── Accessors ──

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn timestamps(&self) -> Option<&[NaiveDateTime]> {
        self.timestamps.as_deref()
    }

    pub fn convention(&self) -> SignalConvention {
        self.convention
    }

    pub fn bar(&self, index: usize) -> Option<PriceBar> {
        let close = *self.close.get(index)?;
        Some(PriceBar {
            index,
            close,
            high: self.high.as_ref().map(|h| h[index]),
            low: self.low.as_ref().map(|l| l[index]),
            timestamp: self.timestamps.as_ref().map(|t| t[index]),
        })
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Look up a signal by combination key. Accepts both `rsi` and `rsi_signal`.
    pub fn signal(&self, key: &str) -> Option<&[f64]> {
        let key = key.trim().to_ascii_lowercase();
        if let Some(values) = self.signals.get(&key) {
            return Some(values);
        }
        key.strip_suffix(SIGNAL_SUFFIX)
            .and_then(|base| self.signals.get(base))
            .map(Vec::as_slice)
    }

    /// Name and values of the regime column, if one was promoted.
    pub fn regime(&self) -> Option<(&str, &[f64])> {
        self.regime
            .as_ref()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn regime_gates(&self, mode: RegimeMode) -> Option<SideGates> {
        self.regime()
            .map(|(_, values)| SideGates::from_regime(values, mode))
    }

    /// Holding time of a trade in minutes, when the table carries timestamps.
    pub fn hold_minutes(&self, trade: &Trade) -> Option<f64> {
        let ts = self.timestamps.as_ref()?;
        let entry = ts.get(trade.entry_index)?;
        let exit = ts.get(trade.exit_index)?;
        Some((*exit - *entry).num_seconds() as f64 / 60.0)
    }

    /// Deterministic BLAKE3 hash over closes, signal columns and the regime column.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format!("{:?}", self.convention).as_bytes());
        for c in &self.close {
            hasher.update(&c.to_le_bytes());
        }
        let regime = self.regime.iter().map(|(name, values)| (name, values));
        for (name, values) in self.signals.iter().chain(regime) {
            hasher.update(name.as_bytes());
            for v in values {
                hasher.update(&v.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, Side};

    fn cols(pairs: &[(&str, Vec<f64>)]) -> BTreeMap<String, Vec<f64>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_close_is_fatal() {
        let err = PriceTable::from_columns(
            cols(&[("rsi_signal", vec![1.0, 0.0])]),
            SignalConvention::Discrete,
        )
        .unwrap_err();
        assert_eq!(err, TableError::MissingClose);
    }

    #[test]
    fn close_is_case_insensitive() {
        let t = PriceTable::from_columns(
            cols(&[("Close", vec![1.0, 2.0])]),
            SignalConvention::Discrete,
        )
        .unwrap();
        assert_eq!(t.close(), &[1.0, 2.0]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = PriceTable::from_columns(
            cols(&[("close", vec![1.0, 2.0]), ("rsi", vec![1.0])]),
            SignalConvention::Discrete,
        )
        .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { actual: 1, .. }));
    }

    #[test]
    fn price_columns_are_not_signals() {
        let t = PriceTable::from_columns(
            cols(&[
                ("close", vec![1.0, 2.0]),
                ("open", vec![1.0, 2.0]),
                ("volume", vec![10.0, 20.0]),
                ("macd_signal", vec![0.5, -0.5]),
            ]),
            SignalConvention::Discrete,
        )
        .unwrap();
        let names: Vec<&str> = t.signal_names().collect();
        assert_eq!(names, vec!["macd"]);
    }

    #[test]
    fn lookup_accepts_raw_and_suffixed_keys() {
        let t = PriceTable::new(vec![1.0, 2.0], SignalConvention::Discrete)
            .with_signal("rsi_signal", vec![1.0, -1.0])
            .unwrap();
        assert_eq!(t.signal("rsi"), Some(&[1.0, -1.0][..]));
        assert_eq!(t.signal("rsi_signal"), Some(&[1.0, -1.0][..]));
        assert_eq!(t.signal("RSI"), Some(&[1.0, -1.0][..]));
        assert!(t.signal("macd").is_none());
    }

    #[test]
    fn suffixed_column_wins_over_raw() {
        let t = PriceTable::new(vec![1.0, 2.0], SignalConvention::Continuous)
            .with_signal("rsi_signal", vec![1.0, 1.0])
            .unwrap()
            .with_signal("rsi", vec![55.0, 70.0])
            .unwrap();
        assert_eq!(t.signal("rsi"), Some(&[1.0, 1.0][..]));

        let t = PriceTable::new(vec![1.0, 2.0], SignalConvention::Continuous)
            .with_signal("rsi", vec![55.0, 70.0])
            .unwrap()
            .with_signal("rsi_signal", vec![-1.0, 0.0])
            .unwrap();
        assert_eq!(t.signal("rsi"), Some(&[-1.0, 0.0][..]));
    }

    #[test]
    fn discrete_convention_snaps_to_sign() {
        let t = PriceTable::new(vec![1.0; 5], SignalConvention::Discrete)
            .with_signal("x", vec![0.3, -2.0, 0.0, f64::NAN, f64::INFINITY])
            .unwrap();
        assert_eq!(t.signal("x"), Some(&[1.0, -1.0, 0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn continuous_convention_keeps_values() {
        let t = PriceTable::new(vec![1.0; 3], SignalConvention::Continuous)
            .with_signal("x", vec![0.3, -2.0, f64::NEG_INFINITY])
            .unwrap();
        assert_eq!(t.signal("x"), Some(&[0.3, -2.0, 0.0][..]));
    }

    #[test]
    fn non_finite_close_becomes_zero() {
        let t = PriceTable::new(vec![100.0, f64::NAN], SignalConvention::Discrete);
        assert_eq!(t.close(), &[100.0, 0.0]);
    }

    #[test]
    fn regime_column_leaves_signal_map() {
        let t = PriceTable::new(vec![1.0; 3], SignalConvention::Discrete)
            .with_signal("rsi_signal", vec![1.0, 1.0, 1.0])
            .unwrap()
            .with_signal("regime_signal", vec![1.0, 0.0, -1.0])
            .unwrap()
            .with_regime_column("regime")
            .unwrap();
        assert_eq!(t.signal_names().collect::<Vec<_>>(), vec!["rsi"]);
        assert!(t.signal("regime").is_none());
        assert_eq!(t.regime(), Some(("regime", &[1.0, 0.0, -1.0][..])));

        let gates = t.regime_gates(RegimeMode::Directional).unwrap();
        assert!(gates.for_side(Side::Long).is_open(0));
        assert!(!gates.for_side(Side::Long).is_open(2));
        assert!(gates.for_side(Side::Short).is_open(2));
    }

    #[test]
    fn missing_regime_column_is_rejected() {
        let err = PriceTable::new(vec![1.0; 2], SignalConvention::Discrete)
            .with_regime_column("ma200_up")
            .unwrap_err();
        assert_eq!(err, TableError::MissingRegime("ma200_up".into()));

        let bare = PriceTable::new(vec![1.0; 2], SignalConvention::Discrete);
        assert!(bare.regime_gates(RegimeMode::Nonzero).is_none());
    }

    #[test]
    fn hold_minutes_from_timestamps() {
        let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ts: Vec<NaiveDateTime> = (0..4)
            .map(|i| base + chrono::Duration::minutes(i))
            .collect();
        let t = PriceTable::new(vec![1.0; 4], SignalConvention::Discrete)
            .with_timestamps(ts)
            .unwrap();
        let trade = Trade {
            side: Side::Long,
            entry_index: 1,
            entry_price: 1.0,
            exit_index: 3,
            exit_price: 1.0,
            exit_reason: ExitReason::ScoreExit,
            gross_return: 0.0,
            net_return: 0.0,
        };
        assert_eq!(t.hold_minutes(&trade), Some(2.0));

        let bare = PriceTable::new(vec![1.0; 4], SignalConvention::Discrete);
        assert_eq!(bare.hold_minutes(&trade), None);
    }

    #[test]
    fn content_hash_is_deterministic_and_sensitive() {
        let a = PriceTable::new(vec![1.0, 2.0], SignalConvention::Discrete)
            .with_signal("rsi", vec![1.0, 0.0])
            .unwrap();
        let b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());

        let c = PriceTable::new(vec![1.0, 2.5], SignalConvention::Discrete)
            .with_signal("rsi", vec![1.0, 0.0])
            .unwrap();
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn bar_accessor() {
        let t = PriceTable::new(vec![10.0, 11.0], SignalConvention::Discrete)
            .with_high_low(vec![10.5, 11.5], vec![9.5, 10.5])
            .unwrap();
        let bar = t.bar(1).unwrap();
        assert_eq!(bar.close, 11.0);
        assert_eq!(bar.high, Some(11.5));
        assert!(t.bar(2).is_none());
    }
}
