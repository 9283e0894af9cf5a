//! ComboLab CLI — evaluate, sweep, generate and summarize commands.
//!
//! Commands:
//! - `evaluate` — score one combination against the price table and print metrics
//! - `sweep` — evaluate a candidate file in parallel, write ranked results
//! - `generate grid|expand|random` — build candidate files
//! - `summarize` — statistics, robust slice and top list from a results file
//! - `validate` — preflight a price file and candidate files

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use combolab_core::{Direction, WeightedCombination};
use combolab_runner::export::{candidates_csv, read_results_csv, trades_csv, write_output};
use combolab_runner::generator::{default_weights, expand_seeds, random_combinations, GridSpec, DEFAULT_SIGNALS};
use combolab_runner::summary::{summary_text, write_summary};
use combolab_runner::{
    evaluate_single, load_candidates, preflight, run_research, summarize, write_report,
    RankingMetric, ResearchConfig, ResearchReport, RobustCriteria, SingleRun,
};
use tracing::info;

const DEFAULT_CONFIG: &str = "combolab.toml";

#[derive(Parser)]
#[command(
    name = "combolab",
    about = "ComboLab CLI — weighted signal combination research on 1-minute bars"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single combination and print its metrics.
    Evaluate {
        /// Combination as JSON or a Python dict literal, e.g. "{'rsi': 0.5, 'macd': 0.3}".
        combination: String,

        /// Path to a TOML config file. Defaults to ./combolab.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Price table (CSV or Parquet), overriding the config.
        #[arg(long)]
        data: Option<PathBuf>,

        /// long, short or both. Defaults to the config's sweep direction.
        #[arg(long)]
        direction: Option<Direction>,

        /// Write the trade tape to this CSV file.
        #[arg(long)]
        trades: Option<PathBuf>,

        /// Print the result as JSON instead of a text summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Evaluate every combination in a candidate file.
    Sweep {
        /// Candidate CSV with a `Combination` column.
        candidates: PathBuf,

        /// Path to a TOML config file. Defaults to ./combolab.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Price table (CSV or Parquet), overriding the config.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output directory, overriding the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Worker threads (0 = all cores), overriding the config.
        #[arg(long)]
        threads: Option<usize>,

        /// long, short or both, overriding the config.
        #[arg(long)]
        direction: Option<Direction>,

        /// Ranking metric: roi, winrate, sharpe, num_trades, avg_trade, profit_factor.
        #[arg(long)]
        sort_by: Option<RankingMetric>,

        /// Overwrite existing outputs instead of backing them up.
        #[arg(long, default_value_t = false)]
        no_backup: bool,
    },
    /// Generate candidate files.
    Generate {
        #[command(subcommand)]
        mode: GenerateMode,
    },
    /// Summarize a results CSV.
    Summarize {
        /// Results CSV written by `sweep`.
        results: PathBuf,

        /// Directory for ranked.csv, robust.csv, top.csv and summary.txt.
        #[arg(long, default_value = "results/summary")]
        out_dir: PathBuf,

        /// Length of the top list.
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Minimum trade count for the robust slice.
        #[arg(long, default_value_t = 100)]
        min_trades: usize,

        /// Minimum win rate for the robust slice.
        #[arg(long, default_value_t = 0.5)]
        min_winrate: f64,

        /// Ranking metric.
        #[arg(long, default_value = "roi")]
        sort_by: RankingMetric,
    },
    /// Check a price file and candidate files before a long sweep.
    Validate {
        /// Price table (CSV or Parquet). Defaults to the config's data path.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Candidate files to check.
        #[arg(long)]
        candidates: Vec<PathBuf>,

        /// Path to a TOML config file. Defaults to ./combolab.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GenerateMode {
    /// Every K-of-N signal subset crossed with a weight grid.
    Grid {
        /// Signals per combination.
        #[arg(long)]
        k: usize,

        /// Comma-separated signal names. Defaults to the twelve standard signals.
        #[arg(long)]
        signals: Option<String>,

        /// Comma-separated weights. Defaults to 0.1,0.2,...,1.0.
        #[arg(long)]
        weights: Option<String>,

        /// Refuse to generate more than this many combinations.
        #[arg(long, default_value_t = 5_000_000)]
        limit: u64,

        /// Output CSV.
        #[arg(long)]
        out: PathBuf,
    },
    /// Grow K-signal seeds to K+1 signals.
    Expand {
        /// Candidate or results CSV with a `Combination` column.
        seeds: PathBuf,

        /// Weight given to the added signal.
        #[arg(long, default_value_t = 0.1)]
        weight: f64,

        /// Maximum children per seed.
        #[arg(long, default_value_t = 12)]
        max_per_seed: usize,

        /// Comma-separated signal names. Defaults to the twelve standard signals.
        #[arg(long)]
        signals: Option<String>,

        /// Output CSV.
        #[arg(long)]
        out: PathBuf,
    },
    /// Seeded random K-combinations.
    Random {
        #[arg(long)]
        k: usize,

        /// Number of unique combinations to draw.
        #[arg(long)]
        count: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Comma-separated signal names. Defaults to the twelve standard signals.
        #[arg(long)]
        signals: Option<String>,

        /// Comma-separated weights. Defaults to 0.1,0.2,...,1.0.
        #[arg(long)]
        weights: Option<String>,

        /// Output CSV.
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Evaluate {
            combination,
            config,
            data,
            direction,
            trades,
            json,
        } => run_evaluate(&combination, config, data, direction, trades, json),
        Commands::Sweep {
            candidates,
            config,
            data,
            output_dir,
            threads,
            direction,
            sort_by,
            no_backup,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(data) = data {
                cfg.data.path = data;
            }
            if let Some(dir) = output_dir {
                cfg.output.dir = dir;
            }
            if let Some(threads) = threads {
                cfg.sweep.threads = threads;
            }
            if let Some(direction) = direction {
                cfg.sweep.direction = direction;
            }
            if let Some(metric) = sort_by {
                cfg.ranking.sort_by = metric;
            }
            if no_backup {
                cfg.output.backup_existing = false;
            }
            run_sweep_cmd(&cfg, &candidates)
        }
        Commands::Generate { mode } => run_generate(mode),
        Commands::Summarize {
            results,
            out_dir,
            top,
            min_trades,
            min_winrate,
            sort_by,
        } => {
            let criteria = RobustCriteria {
                min_trades,
                min_winrate,
            };
            run_summarize(&results, &out_dir, top, criteria, sort_by)
        }
        Commands::Validate {
            data,
            candidates,
            config,
        } => run_validate(data, &candidates, config),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ResearchConfig> {
    match path {
        Some(p) => Ok(ResearchConfig::from_file(p)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            info!(path = DEFAULT_CONFIG, "using config from working directory");
            Ok(ResearchConfig::from_file(Path::new(DEFAULT_CONFIG))?)
        }
        None => Ok(ResearchConfig::default()),
    }
}

// ─── Commands ───────────────────────────────────────────────────────

fn run_evaluate(
    combination: &str,
    config: Option<PathBuf>,
    data: Option<PathBuf>,
    direction: Option<Direction>,
    trades_out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut cfg = load_config(config.as_deref())?;
    if let Some(data) = data {
        cfg.data.path = data;
    }
    let combo = WeightedCombination::parse(combination)
        .with_context(|| format!("invalid combination: {combination}"))?;
    let direction = direction.unwrap_or(cfg.sweep.direction);

    let run = evaluate_single(&cfg, combo, direction)?;

    if let Some(path) = trades_out {
        let tape = trades_csv(&run.evaluation.trades, &run.table)?;
        write_output(&path, &tape, cfg.output.backup_existing)?;
        info!(path = %path.display(), trades = run.evaluation.trades.len(), "wrote trade tape");
    }

    if json {
        let out = serde_json::json!({
            "combination": run.combination,
            "direction": run.direction,
            "dataset_hash": run.dataset_hash,
            "result": run.evaluation.result,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_evaluation(&run);
    }
    Ok(())
}

fn run_sweep_cmd(cfg: &ResearchConfig, candidates: &Path) -> Result<()> {
    let report = run_research(cfg, candidates)?;
    let written = write_report(&report, &cfg.output)?;
    print_sweep_summary(cfg, &report);
    for path in written {
        println!("Wrote: {}", path.display());
    }
    Ok(())
}

fn run_generate(mode: GenerateMode) -> Result<()> {
    let (combos, out) = match mode {
        GenerateMode::Grid {
            k,
            signals,
            weights,
            limit,
            out,
        } => {
            let spec = GridSpec::new(parse_signals(signals.as_deref()), k, parse_weights(weights.as_deref())?);
            info!(k, estimate = spec.estimate() as f64, "generating grid");
            (spec.generate_bounded(u128::from(limit))?, out)
        }
        GenerateMode::Expand {
            seeds,
            weight,
            max_per_seed,
            signals,
            out,
        } => {
            let set = load_candidates(&seeds)?;
            if !set.failures.is_empty() {
                bail!(
                    "{} malformed seed row(s) in {} (first: row {})",
                    set.failures.len(),
                    seeds.display(),
                    set.failures[0].index + 1
                );
            }
            let seeds: Vec<WeightedCombination> =
                set.candidates.into_iter().map(|c| c.combination).collect();
            let universe = parse_signals(signals.as_deref());
            (expand_seeds(&seeds, &universe, weight, max_per_seed)?, out)
        }
        GenerateMode::Random {
            k,
            count,
            seed,
            signals,
            weights,
            out,
        } => {
            let universe = parse_signals(signals.as_deref());
            let weights = parse_weights(weights.as_deref())?;
            let combos = random_combinations(&universe, k, &weights, count, seed)?;
            if combos.len() < count {
                tracing::warn!(requested = count, produced = combos.len(), "search space exhausted early");
            }
            (combos, out)
        }
    };

    write_output(&out, &candidates_csv(&combos)?, true)?;
    println!("Generated {} combination(s) → {}", combos.len(), out.display());
    Ok(())
}

fn run_summarize(
    results: &Path,
    out_dir: &Path,
    top: usize,
    criteria: RobustCriteria,
    metric: RankingMetric,
) -> Result<()> {
    let records = read_results_csv(results)?;
    let summary = summarize(&records, metric, criteria, top);
    write_summary(&summary, &criteria, out_dir, true)?;
    print!("{}", summary_text(&summary, &criteria));
    println!();
    println!("Summary files saved to: {}", out_dir.display());
    Ok(())
}

fn run_validate(data: Option<PathBuf>, candidates: &[PathBuf], config: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config.as_deref())?;
    let data = data.unwrap_or(cfg.data.path);
    let mut ok = true;

    let report = preflight(&data, cfg.data.regime_column.as_deref())?;
    println!("=== Price Table: {} ===", data.display());
    println!("Rows:           {}", report.rows);
    println!("Close column:   {}", if report.has_close { "yes" } else { "MISSING" });
    println!(
        "Time column:    {}",
        report.time_column.as_deref().unwrap_or("none")
    );
    println!("Signals:        {}", report.signal_columns.join(", "));
    if let Some(regime) = cfg.data.regime_column.as_deref() {
        println!("Regime:         {regime} ({:?})", cfg.data.regime_mode);
    }
    for problem in &report.problems {
        println!("PROBLEM: {problem}");
    }
    ok &= report.is_ok();

    for path in candidates {
        println!();
        println!("=== Candidates: {} ===", path.display());
        match load_candidates(path) {
            Ok(set) => {
                println!("Parsed:         {}", set.candidates.len());
                println!("Malformed:      {}", set.failures.len());
                for f in set.failures.iter().take(5) {
                    println!("  row {}: {} ({})", f.index + 1, f.raw, f.error);
                }
                let unknown: Vec<String> = set
                    .candidates
                    .iter()
                    .flat_map(|c| c.combination.names().map(str::to_string).collect::<Vec<_>>())
                    .filter(|name| !has_signal(&report.signal_columns, name))
                    .collect::<std::collections::BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if !unknown.is_empty() {
                    println!("Unknown keys:   {}", unknown.join(", "));
                }
                ok &= set.failures.is_empty();
            }
            Err(e) => {
                println!("ERROR: {e}");
                ok = false;
            }
        }
    }

    if !ok {
        bail!("validation failed");
    }
    println!();
    println!("All checks passed.");
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Matches a combination key against raw column names (`rsi` or `rsi_signal`).
fn has_signal(columns: &[String], key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    let suffixed = format!("{key}_signal");
    columns.iter().any(|c| *c == key || *c == suffixed)
}

fn parse_signals(list: Option<&str>) -> Vec<String> {
    match list {
        Some(s) => s
            .split(',')
            .map(|x| x.trim().to_ascii_lowercase())
            .filter(|x| !x.is_empty())
            .collect(),
        None => DEFAULT_SIGNALS.iter().map(|s| s.to_string()).collect(),
    }
}

fn parse_weights(list: Option<&str>) -> Result<Vec<f64>> {
    match list {
        Some(s) => s
            .split(',')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(|x| x.parse::<f64>().with_context(|| format!("invalid weight '{x}'")))
            .collect(),
        None => Ok(default_weights()),
    }
}

fn print_evaluation(run: &SingleRun) {
    let r = &run.evaluation.result;
    println!();
    println!("=== Evaluation Result ===");
    println!("Combination:    {}", run.combination);
    println!("Direction:      {}", run.direction);
    println!("Bars:           {}", run.table.len());
    println!("Dataset:        {}", &run.dataset_hash[..run.dataset_hash.len().min(12)]);
    println!("Trades:         {}", r.num_trades);
    println!();
    println!("--- Performance ---");
    println!("ROI:            {:.4} ({:.2}%)", r.roi, r.roi * 100.0);
    println!("Win Rate:       {:.1}%", r.winrate * 100.0);
    println!("Avg Trade:      {:.4}%", r.avg_trade * 100.0);
    println!("Sharpe:         {:.3}", r.sharpe);
    println!("Profit Factor:  {:.2}", r.profit_factor);
    println!("Max Consec Loss:{}", r.max_consecutive_losses);
    println!();
}

fn print_sweep_summary(cfg: &ResearchConfig, report: &ResearchReport) {
    let outcome = &report.outcome;
    println!();
    println!("=== Sweep Result ===");
    println!("Bars:           {}", report.bar_count);
    println!("Direction:      {}", cfg.sweep.direction);
    println!("Evaluated:      {}", outcome.rows.len());
    println!("Failed:         {}", outcome.failures.len());
    println!(
        "Elapsed:        {:.2}s ({:.1}/s)",
        outcome.elapsed.as_secs_f64(),
        outcome.throughput()
    );
    println!();
    println!(
        "--- Top {} by {} ---",
        report.leaderboard.len().min(10),
        report.leaderboard.metric()
    );
    for (i, e) in report.leaderboard.entries().iter().take(10).enumerate() {
        let r = &e.row.result;
        println!(
            "{:>3}. roi {:>8.4}  trades {:>6}  win {:>5.1}%  {}",
            i + 1,
            r.roi,
            r.num_trades,
            r.winrate * 100.0,
            e.row.combination
        );
    }
    if report.leaderboard.is_empty() {
        println!("(no candidate passed the ranking filter)");
    }
    println!();
}
