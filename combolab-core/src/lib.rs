//! ComboLab Core — evaluation engine for weighted signal combinations.
//!
//! This crate contains the engine and nothing that touches the filesystem:
//! - Domain types (bars, combinations, directions, trades)
//! - The prepared, read-only price table shared across workers
//! - SignalScorer: weighted sum of signal columns into a score series
//! - PositionSimulator: single-position entry/exit state machine
//! - MetricsAggregator: trade list → ROI, win rate, Sharpe, average trade
//! - The `Evaluator` trait tying the three together

pub mod domain;
pub mod evaluator;
pub mod metrics;
pub mod scorer;
pub mod simulator;
pub mod table;

pub use domain::{
    CombinationError, ComboHash, Direction, DirectionParseError, ExitReason, PriceBar, Side,
    Trade, WeightedCombination,
};
pub use evaluator::{Backtester, Evaluation, Evaluator};
pub use metrics::{EvaluationResult, MetricsAggregator, MetricsConfig, RoiMode, MINUTES_PER_YEAR};
pub use scorer::{KeyResolution, SignalScorer};
pub use simulator::{PositionSimulator, RegimeGate, RegimeMode, SideGates, SimulationConfig};
pub use table::{PriceTable, SignalConvention, TableError};
