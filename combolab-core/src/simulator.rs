//! PositionSimulator — single-position state machine over a score series.
//!
//! The simulator walks the bars once. While flat it looks for an entry
//! (`score > enter` for long, `score < -enter` for short) on bars the regime
//! gate leaves open. Once in a position it checks, on every later bar and in
//! this order:
//!
//! 1. take-profit: running return `>= take_profit_pct`
//! 2. stop-loss: running return `<= -stop_loss_pct`
//! 3. score exit: long `score < exit`, short `score > -exit`
//! 4. max hold: `bars held >= max_hold_bars`
//!
//! A position still open on the last bar is closed there as `MaxHoldForced`.
//! After an exit on bar `e` the next entry may happen no earlier than
//! `e + max(1, cooldown_bars)`, so positions never overlap.

use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, Side, Trade};

/// Entry/exit parameters. Returns and fees are fractions, not percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_hold_bars: usize,
    pub enter_threshold: f64,
    pub exit_threshold: f64,
    pub cooldown_bars: usize,
    /// Subtracted once from each completed trade's return.
    pub fee_roundtrip_pct: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: 0.04,
            stop_loss_pct: 0.02,
            max_hold_bars: 1440,
            enter_threshold: 1.0,
            exit_threshold: 0.0,
            cooldown_bars: 0,
            fee_roundtrip_pct: 0.0,
        }
    }
}

/// Per-bar entry permission. Bars past the end of the gate count as closed.
///
/// The gate only ever blocks entries; an open position exits normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeGate(Vec<bool>);

impl RegimeGate {
    pub fn new(open: Vec<bool>) -> Self {
        Self(open)
    }

    pub fn is_open(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fraction of bars on which entries are allowed.
    pub fn open_fraction(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().filter(|o| **o).count() as f64 / self.0.len() as f64
    }
}

impl RegimeGate {
    /// Directional gate from a regime series: long entries where the regime
    /// is positive, short entries where it is negative.
    pub fn for_side(regime: &[f64], side: Side) -> Self {
        let open = regime
            .iter()
            .map(|v| match side {
                Side::Long => *v > 0.0,
                Side::Short => *v < 0.0,
            })
            .collect();
        Self(open)
    }

    /// Any nonzero regime value opens the bar, whatever the side.
    pub fn nonzero(regime: &[f64]) -> Self {
        Self(regime.iter().map(|v| *v != 0.0 && v.is_finite()).collect())
    }
}

impl From<Vec<bool>> for RegimeGate {
    fn from(open: Vec<bool>) -> Self {
        Self::new(open)
    }
}

/// How a regime column turns into entry gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeMode {
    /// `+1` allows longs, `-1` allows shorts, `0` allows neither.
    #[default]
    Directional,
    /// Any nonzero value allows both sides.
    Nonzero,
}

/// One entry gate per side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideGates {
    long: RegimeGate,
    short: RegimeGate,
}

impl SideGates {
    /// The same gate for both sides.
    pub fn uniform(gate: RegimeGate) -> Self {
        Self {
            long: gate.clone(),
            short: gate,
        }
    }

    pub fn from_regime(regime: &[f64], mode: RegimeMode) -> Self {
        match mode {
            RegimeMode::Directional => Self {
                long: RegimeGate::for_side(regime, Side::Long),
                short: RegimeGate::for_side(regime, Side::Short),
            },
            RegimeMode::Nonzero => Self::uniform(RegimeGate::nonzero(regime)),
        }
    }

    pub fn for_side(&self, side: Side) -> &RegimeGate {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Flat,
    Open { entry_index: usize, entry_price: f64 },
}

#[derive(Debug, Clone)]
pub struct PositionSimulator<'g> {
    config: SimulationConfig,
    gate: Option<&'g RegimeGate>,
}

impl<'g> PositionSimulator<'g> {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config, gate: None }
    }

    pub fn with_gate(mut self, gate: &'g RegimeGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run one side over the series. `score` and `close` are read up to the
    /// shorter of the two lengths.
    pub fn run(&self, score: &[f64], close: &[f64], side: Side) -> Vec<Trade> {
        let n = score.len().min(close.len());
        let cfg = &self.config;
        let mut trades = Vec::new();
        let mut state = State::Flat;
        let mut next_entry = 0usize;

        for i in 0..n {
            match state {
                State::Flat => {
                    if i < next_entry || !self.entry_allowed(i) {
                        continue;
                    }
                    if self.enters(side, score[i]) {
                        state = State::Open {
                            entry_index: i,
                            entry_price: close[i],
                        };
                        if cfg.max_hold_bars == 0 {
                            trades.push(self.close_trade(
                                side,
                                i,
                                close[i],
                                i,
                                close[i],
                                ExitReason::MaxHoldForced,
                            ));
                            next_entry = i + cfg.cooldown_bars.max(1);
                            state = State::Flat;
                        }
                    }
                }
                State::Open {
                    entry_index,
                    entry_price,
                } => {
                    let r = running_return(side, entry_price, close[i]);
                    let reason = if r >= cfg.take_profit_pct {
                        Some(ExitReason::TakeProfit)
                    } else if r <= -cfg.stop_loss_pct {
                        Some(ExitReason::StopLoss)
                    } else if self.score_exits(side, score[i]) {
                        Some(ExitReason::ScoreExit)
                    } else if i - entry_index >= cfg.max_hold_bars {
                        Some(ExitReason::MaxHoldForced)
                    } else {
                        None
                    };

                    if let Some(reason) = reason {
                        trades.push(self.close_trade(
                            side,
                            entry_index,
                            entry_price,
                            i,
                            close[i],
                            reason,
                        ));
                        next_entry = i + cfg.cooldown_bars.max(1);
                        state = State::Flat;
                    }
                }
            }
        }

        // Never leave a position unresolved: close on the last bar.
        if let State::Open {
            entry_index,
            entry_price,
        } = state
        {
            let last = n - 1;
            trades.push(self.close_trade(
                side,
                entry_index,
                entry_price,
                last,
                close[last],
                ExitReason::MaxHoldForced,
            ));
        }

        trades
    }

    fn entry_allowed(&self, index: usize) -> bool {
        self.gate.map_or(true, |g| g.is_open(index))
    }

    fn enters(&self, side: Side, score: f64) -> bool {
        match side {
            Side::Long => score > self.config.enter_threshold,
            Side::Short => score < -self.config.enter_threshold,
        }
    }

    fn score_exits(&self, side: Side, score: f64) -> bool {
        match side {
            Side::Long => score < self.config.exit_threshold,
            Side::Short => score > -self.config.exit_threshold,
        }
    }

    fn close_trade(
        &self,
        side: Side,
        entry_index: usize,
        entry_price: f64,
        exit_index: usize,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> Trade {
        let gross = running_return(side, entry_price, exit_price);
        let net = gross - self.config.fee_roundtrip_pct;
        Trade {
            side,
            entry_index,
            entry_price,
            exit_index,
            exit_price,
            exit_reason,
            gross_return: gross,
            net_return: if net.is_finite() { net } else { 0.0 },
        }
    }
}

/// Fractional return of a position at `price`; 0.0 when undefined.
pub fn running_return(side: Side, entry_price: f64, price: f64) -> f64 {
    let r = match side {
        Side::Long => (price - entry_price) / entry_price,
        Side::Short => (entry_price - price) / entry_price,
    };
    if r.is_finite() {
        r
    } else {
        0.0
    }
}
