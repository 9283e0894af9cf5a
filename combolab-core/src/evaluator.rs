//! Evaluator — the score → simulate → aggregate pipeline behind one trait.
//!
//! Orchestration code holds a `&dyn Evaluator` (or an `Arc<dyn Evaluator>`)
//! and never needs to know which implementation it is driving.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, Trade, WeightedCombination};
use crate::metrics::{EvaluationResult, MetricsAggregator, MetricsConfig};
use crate::scorer::SignalScorer;
use crate::simulator::{PositionSimulator, SideGates, SimulationConfig};
use crate::table::PriceTable;

/// Aggregate result plus the trades that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result: EvaluationResult,
    pub trades: Vec<Trade>,
}

/// A strategy evaluator. Implementations must be pure with respect to the
/// table: the same inputs always give the same `Evaluation`.
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        table: &PriceTable,
        combination: &WeightedCombination,
        direction: Direction,
    ) -> Evaluation;

    /// Re-aggregate a filtered subset of trades with this evaluator's metrics.
    fn aggregate(&self, trades: &[Trade]) -> EvaluationResult;
}

/// Threshold-crossing backtester over a prepared [`PriceTable`].
#[derive(Debug, Clone, Default)]
pub struct Backtester {
    simulation: SimulationConfig,
    metrics: MetricsConfig,
    gates: Option<Arc<SideGates>>,
}

impl Backtester {
    pub fn new(simulation: SimulationConfig, metrics: MetricsConfig) -> Self {
        Self {
            simulation,
            metrics,
            gates: None,
        }
    }

    /// Gate entries per side. Exits are never gated.
    pub fn with_gates(mut self, gates: Arc<SideGates>) -> Self {
        self.gates = Some(gates);
        self
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }

    pub fn gates(&self) -> Option<&SideGates> {
        self.gates.as_deref()
    }
}

impl Evaluator for Backtester {
    fn name(&self) -> &str {
        "backtester"
    }

    fn evaluate(
        &self,
        table: &PriceTable,
        combination: &WeightedCombination,
        direction: Direction,
    ) -> Evaluation {
        let score = SignalScorer::new().score(table, combination);

        // Each side runs on its own; `Both` concatenates long then short.
        let mut trades = Vec::new();
        for side in direction.sides() {
            let mut sim = PositionSimulator::new(self.simulation);
            if let Some(gates) = self.gates.as_deref() {
                sim = sim.with_gate(gates.for_side(*side));
            }
            trades.extend(sim.run(&score, table.close(), *side));
        }

        Evaluation {
            result: self.aggregate(&trades),
            trades,
        }
    }

    fn aggregate(&self, trades: &[Trade]) -> EvaluationResult {
        MetricsAggregator::new(self.metrics).aggregate(trades)
    }
}
