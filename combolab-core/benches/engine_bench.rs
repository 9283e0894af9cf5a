//! Criterion benchmarks for the evaluation hot path.
//!
//! Benchmarks:
//! 1. Scoring a K-signal combination over a year of 1-minute bars
//! 2. Simulating one side over a precomputed score series
//! 3. Full evaluation (score + simulate + aggregate) for long and both

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use combolab_core::{
    Backtester, Direction, Evaluator, MetricsConfig, PositionSimulator, PriceTable, Side,
    SignalConvention, SignalScorer, SimulationConfig, WeightedCombination,
};

const SIGNALS: [&str; 12] = [
    "rsi", "macd", "bollinger", "ma200", "stoch", "atr", "ema50", "adx", "cci", "mfi", "obv", "roc",
];

// ── Helpers ──────────────────────────────────────────────────────────

fn make_table(n: usize) -> PriceTable {
    let close: Vec<f64> = (0..n)
        .map(|i| 30_000.0 + (i as f64 * 0.01).sin() * 500.0 + (i as f64 * 0.173).cos() * 40.0)
        .collect();
    let mut table = PriceTable::new(close, SignalConvention::Discrete);
    for (k, name) in SIGNALS.iter().enumerate() {
        let period = 17.0 + k as f64 * 3.0;
        let values: Vec<f64> = (0..n)
            .map(|i| ((i as f64 / period).sin() * 1.5).round())
            .collect();
        table = table
            .with_signal(&format!("{name}_signal"), values)
            .expect("generated columns share the close length");
    }
    table
}

fn make_combo(k: usize) -> WeightedCombination {
    SIGNALS
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, name)| (*name, 0.3 + 0.1 * i as f64))
        .collect()
}

fn bench_config() -> SimulationConfig {
    SimulationConfig {
        enter_threshold: 0.8,
        ..Default::default()
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_scoring(c: &mut Criterion) {
    let table = make_table(525_600);
    let mut group = c.benchmark_group("score");
    for k in [2, 5, 12] {
        let combo = make_combo(k);
        group.bench_with_input(BenchmarkId::from_parameter(k), &combo, |b, combo| {
            b.iter(|| SignalScorer::new().score(black_box(&table), black_box(combo)))
        });
    }
    group.finish();
}

fn bench_simulation(c: &mut Criterion) {
    let table = make_table(525_600);
    let score = SignalScorer::new().score(&table, &make_combo(5));
    let sim = PositionSimulator::new(bench_config());
    c.bench_function("simulate_long_1y", |b| {
        b.iter(|| sim.run(black_box(&score), black_box(table.close()), Side::Long))
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let table = make_table(525_600);
    let combo = make_combo(5);
    let bt = Backtester::new(bench_config(), MetricsConfig::default());
    let mut group = c.benchmark_group("evaluate_1y");
    for direction in [Direction::Long, Direction::Both] {
        group.bench_with_input(
            BenchmarkId::from_parameter(direction),
            &direction,
            |b, direction| b.iter(|| bt.evaluate(black_box(&table), &combo, *direction)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_scoring, bench_simulation, bench_evaluate);
criterion_main!(benches);
