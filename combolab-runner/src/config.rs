//! TOML research configuration.
//!
//! Every section and field is optional; missing values take the documented
//! defaults, so an empty file is a valid config that points at
//! `data/btc_1m_signals.csv`.
//!
//! ```toml
//! [data]
//! path = "data/btc_1m_signals.parquet"
//! convention = "discrete"
//! regime_column = "ma200_up"
//! regime_mode = "directional"
//!
//! [simulation]
//! take_profit_pct = 0.04
//! stop_loss_pct = 0.02
//! max_hold_bars = 1440
//! enter_threshold = 1.0
//! exit_threshold = 0.0
//!
//! [sweep]
//! direction = "long"
//! threads = 0
//!
//! [ranking]
//! sort_by = "roi"
//! min_trades = 10
//! top_n = 200
//! ```

use std::path::{Path, PathBuf};

use combolab_core::{Direction, MetricsConfig, RegimeMode, SignalConvention, SimulationConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::leaderboard::{RankingFilter, RankingMetric};
use crate::sweep::HoldFilter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub data: DataConfig,
    pub simulation: SimulationConfig,
    pub metrics: MetricsConfig,
    pub sweep: SweepConfig,
    pub ranking: RankingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: PathBuf,
    pub convention: SignalConvention,
    /// Column used as an entry gate instead of a signal.
    pub regime_column: Option<String>,
    /// `directional`: +1 allows longs, -1 allows shorts. `nonzero`: any
    /// nonzero value allows both.
    pub regime_mode: RegimeMode,
    /// First row to keep.
    pub offset: usize,
    /// Maximum number of rows to keep after `offset`.
    pub limit: Option<usize>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/btc_1m_signals.csv"),
            convention: SignalConvention::Discrete,
            regime_column: None,
            regime_mode: RegimeMode::Directional,
            offset: 0,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub direction: Direction,
    /// Worker threads; 0 uses every core.
    pub threads: usize,
    /// Log progress every N percent of candidates.
    pub progress_every_pct: usize,
    /// Keep only trades held at least this many minutes.
    pub min_hold_mins: Option<f64>,
    /// Keep only trades held at most this many minutes.
    pub max_hold_mins: Option<f64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Long,
            threads: 0,
            progress_every_pct: 10,
            min_hold_mins: None,
            max_hold_mins: None,
        }
    }
}

impl SweepConfig {
    pub fn hold_filter(&self) -> Option<HoldFilter> {
        if self.min_hold_mins.is_none() && self.max_hold_mins.is_none() {
            return None;
        }
        Some(HoldFilter {
            min_mins: self.min_hold_mins,
            max_mins: self.max_hold_mins,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub sort_by: RankingMetric,
    pub min_trades: usize,
    pub max_trades: Option<usize>,
    pub min_winrate: f64,
    pub top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            sort_by: RankingMetric::Roi,
            min_trades: 1,
            max_trades: None,
            min_winrate: 0.0,
            top_n: 200,
        }
    }
}

impl RankingConfig {
    pub fn filter(&self) -> RankingFilter {
        RankingFilter {
            min_trades: self.min_trades,
            max_trades: self.max_trades,
            min_winrate: self.min_winrate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub results_file: String,
    pub errors_file: String,
    pub leaderboard_file: String,
    /// Move an existing output file aside before overwriting it.
    pub backup_existing: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            results_file: "strategy_results.csv".into(),
            errors_file: "strategy_errors.csv".into(),
            leaderboard_file: "leaderboard.csv".into(),
            backup_existing: true,
        }
    }
}

impl OutputConfig {
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(&self.results_file)
    }

    pub fn errors_path(&self) -> PathBuf {
        self.dir.join(&self.errors_file)
    }

    pub fn leaderboard_path(&self) -> PathBuf {
        self.dir.join(&self.leaderboard_file)
    }
}

impl ResearchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        for (name, v) in [
            ("take_profit_pct", sim.take_profit_pct),
            ("stop_loss_pct", sim.stop_loss_pct),
            ("fee_roundtrip_pct", sim.fee_roundtrip_pct),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "simulation.{name} must be a non-negative number, got {v}"
                )));
            }
        }
        for (name, v) in [
            ("enter_threshold", sim.enter_threshold),
            ("exit_threshold", sim.exit_threshold),
        ] {
            if !v.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "simulation.{name} must be finite, got {v}"
                )));
            }
        }
        if let Some(p) = self.metrics.sharpe_periods_per_year {
            if !p.is_finite() || p <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "metrics.sharpe_periods_per_year must be positive, got {p}"
                )));
            }
        }
        if self.ranking.top_n == 0 {
            return Err(ConfigError::Invalid("ranking.top_n must be at least 1".into()));
        }
        if let Some(max) = self.ranking.max_trades {
            if max < self.ranking.min_trades {
                return Err(ConfigError::Invalid(format!(
                    "ranking.max_trades ({max}) is below ranking.min_trades ({})",
                    self.ranking.min_trades
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.ranking.min_winrate) {
            return Err(ConfigError::Invalid(format!(
                "ranking.min_winrate must be within [0, 1], got {}",
                self.ranking.min_winrate
            )));
        }
        if let (Some(lo), Some(hi)) = (self.sweep.min_hold_mins, self.sweep.max_hold_mins) {
            if lo > hi {
                return Err(ConfigError::Invalid(format!(
                    "sweep.min_hold_mins ({lo}) exceeds sweep.max_hold_mins ({hi})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combolab_core::RoiMode;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg = ResearchConfig::from_toml("").unwrap();
        assert_eq!(cfg, ResearchConfig::default());
        assert_eq!(cfg.simulation.take_profit_pct, 0.04);
        assert_eq!(cfg.simulation.max_hold_bars, 1440);
        assert_eq!(cfg.sweep.direction, Direction::Long);
        assert_eq!(cfg.data.convention, SignalConvention::Discrete);
        assert_eq!(cfg.data.regime_mode, RegimeMode::Directional);
        assert!(cfg.sweep.hold_filter().is_none());
    }

    #[test]
    fn full_config_parses() {
        let cfg = ResearchConfig::from_toml(
            r#"
[data]
path = "data/btc.parquet"
convention = "continuous"
regime_column = "ma200_up"
regime_mode = "nonzero"
limit = 10000

[simulation]
take_profit_pct = 0.03
stop_loss_pct = 0.015
max_hold_bars = 240
enter_threshold = 0.8
exit_threshold = 0.1
cooldown_bars = 5
fee_roundtrip_pct = 0.0008

[metrics]
roi_mode = "compounded"
sharpe_periods_per_year = 362880.0

[sweep]
direction = "both"
threads = 4
min_hold_mins = 5.0

[ranking]
sort_by = "winrate"
min_trades = 50
max_trades = 5000
min_winrate = 0.55
top_n = 20

[output]
dir = "out"
backup_existing = false
"#,
        )
        .unwrap();

        assert_eq!(cfg.data.path, PathBuf::from("data/btc.parquet"));
        assert_eq!(cfg.data.convention, SignalConvention::Continuous);
        assert_eq!(cfg.data.regime_column.as_deref(), Some("ma200_up"));
        assert_eq!(cfg.data.regime_mode, RegimeMode::Nonzero);
        assert_eq!(cfg.data.limit, Some(10000));
        assert_eq!(cfg.simulation.cooldown_bars, 5);
        assert_eq!(cfg.metrics.roi_mode, RoiMode::Compounded);
        assert_eq!(cfg.sweep.direction, Direction::Both);
        assert_eq!(cfg.sweep.threads, 4);
        assert_eq!(cfg.ranking.sort_by, RankingMetric::Winrate);
        assert_eq!(cfg.output.results_path(), PathBuf::from("out/strategy_results.csv"));
        assert!(!cfg.output.backup_existing);

        let hold = cfg.sweep.hold_filter().unwrap();
        assert_eq!(hold.min_mins, Some(5.0));
        assert_eq!(hold.max_mins, None);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg = ResearchConfig::from_toml("[simulation]\nenter_threshold = 2.0\n").unwrap();
        assert_eq!(cfg.simulation.enter_threshold, 2.0);
        assert_eq!(cfg.simulation.stop_loss_pct, 0.02);
    }

    #[test]
    fn negative_take_profit_rejected() {
        let err = ResearchConfig::from_toml("[simulation]\ntake_profit_pct = -0.1\n").unwrap_err();
        assert!(err.to_string().contains("take_profit_pct"));
    }

    #[test]
    fn max_trades_below_min_rejected() {
        let err = ResearchConfig::from_toml("[ranking]\nmin_trades = 10\nmax_trades = 5\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_top_n_rejected() {
        assert!(ResearchConfig::from_toml("[ranking]\ntop_n = 0\n").is_err());
    }

    #[test]
    fn unknown_direction_is_a_parse_error() {
        let err = ResearchConfig::from_toml("[sweep]\ndirection = \"sideways\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ResearchConfig::from_file(Path::new("/nonexistent/combolab.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/combolab.toml"));
    }

    #[test]
    fn inverted_hold_window_rejected() {
        let err = ResearchConfig::from_toml("[sweep]\nmin_hold_mins = 30.0\nmax_hold_mins = 10.0\n")
            .unwrap_err();
        assert!(err.to_string().contains("min_hold_mins"));
    }
}
