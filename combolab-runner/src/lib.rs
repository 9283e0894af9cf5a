//! ComboLab Runner — research orchestration on top of `combolab-core`.
//!
//! This crate provides:
//! - TOML research configuration with documented defaults
//! - Price table loading from CSV or Parquet, plus preflight validation
//! - Candidate files (JSON or Python dict literals) and candidate generation
//! - Parallel sweeps over a shared table with per-candidate failure capture
//! - Bounded, deduplicated leaderboards and full ranking
//! - CSV export with backup of existing outputs, and post-sweep summaries

pub mod candidates;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod generator;
pub mod leaderboard;
pub mod runner;
pub mod summary;
pub mod sweep;

pub use candidates::{load_candidates, parse_candidates, Candidate, CandidateError, CandidateFailure, CandidateSet};
pub use config::{ConfigError, ResearchConfig};
pub use data_loader::{load_table, preflight, LoadError, LoadOptions, LoadedTable, PreflightReport};
pub use export::ResultRecord;
pub use generator::{expand_seeds, random_combinations, GeneratorError, GridSpec, DEFAULT_SIGNALS};
pub use leaderboard::{InsertResult, Leaderboard, LeaderboardEntry, RankingFilter, RankingMetric};
pub use runner::{
    evaluate_single, run_research, run_sweep, write_report, ResearchReport, RunError, SingleRun,
};
pub use summary::{summarize, RobustCriteria, Summary, SummaryStats};
pub use sweep::{HoldFilter, Sweep, SweepError, SweepOptions, SweepOutcome, SweepRow};
