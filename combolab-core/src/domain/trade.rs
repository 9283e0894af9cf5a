//! Trade — one completed (or force-closed) position.

use super::direction::Side;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    ScoreExit,
    /// Max hold reached, or the series ended with the position still open.
    MaxHoldForced,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::ScoreExit => "score_exit",
            Self::MaxHoldForced => "max_hold_forced",
        };
        f.write_str(s)
    }
}

/// A round trip: entry bar → exit bar, returns as fractions of entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,

    // ── Entry ──
    pub entry_index: usize,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_index: usize,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Return ──
    /// Return before the round-trip fee.
    pub gross_return: f64,
    /// Return after the round-trip fee; the value every metric uses.
    #[serde(rename = "return")]
    pub net_return: f64,
}

impl Trade {
    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }

    pub fn is_winner(&self) -> bool {
        self.net_return > 0.0
    }
}
