//! PriceBar — one row of the prepared price table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single 1-minute observation.
///
/// Only `close` drives the simulator. `high`/`low` are carried for the
/// indicator pipeline upstream and `timestamp` for hold-time reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub index: usize,
    pub close: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
}

impl PriceBar {
    /// A bar with only a close price.
    pub fn close_only(index: usize, close: f64) -> Self {
        Self {
            index,
            close,
            high: None,
            low: None,
            timestamp: None,
        }
    }

    /// High-low span, when both are present and finite.
    pub fn range(&self) -> Option<f64> {
        match (self.high, self.low) {
            (Some(h), Some(l)) if h.is_finite() && l.is_finite() => Some(h - l),
            _ => None,
        }
    }

    /// Basic sanity check: positive finite close, and high >= low when both exist.
    pub fn is_sane(&self) -> bool {
        if !self.close.is_finite() || self.close <= 0.0 {
            return false;
        }
        match (self.high, self.low) {
            (Some(h), Some(l)) => h >= l && h >= self.close && l <= self.close,
            _ => true,
        }
    }
}
