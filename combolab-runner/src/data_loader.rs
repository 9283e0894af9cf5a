//! Price table loading for the runner.
//!
//! Reads a cleaned 1-minute table from CSV (via `csv`) or Parquet (via
//! `polars`), chosen by file extension, and turns it into a prepared
//! [`PriceTable`]:
//! 1. Column names are trimmed and lower-cased (`Close` → `close`)
//! 2. The time column is the first of `open_time`, `timestamp`, `time`;
//!    values may be epoch milliseconds, epoch seconds or datetime strings
//! 3. Non-numeric columns are skipped; unparseable numeric cells become NaN,
//!    which the table turns into 0.0
//! 4. An optional row window (`offset`, `limit`) is applied
//! 5. A configured regime column is moved out of the signal set
//!
//! The table is built once and shared by every sweep worker.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use combolab_core::{PriceTable, SignalConvention, TableError};
use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DataConfig;

/// Accepted time columns, in order of preference.
pub const TIME_COLUMNS: &[&str] = &["open_time", "timestamp", "time"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("unsupported file type '{0}' (expected .csv or .parquet)")]
    UnsupportedFormat(String),

    #[error("{path} contains no rows")]
    Empty { path: PathBuf },

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub convention: SignalConvention,
    pub regime_column: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl From<&DataConfig> for LoadOptions {
    fn from(cfg: &DataConfig) -> Self {
        Self {
            convention: cfg.convention,
            regime_column: cfg.regime_column.clone(),
            offset: cfg.offset,
            limit: cfg.limit,
        }
    }
}

/// A loaded table plus provenance.
#[derive(Debug)]
pub struct LoadedTable {
    pub table: PriceTable,
    pub path: PathBuf,
    /// BLAKE3 over closes and signal columns.
    pub dataset_hash: String,
    pub time_column: Option<String>,
    /// Columns dropped because they held no numeric data.
    pub skipped_columns: Vec<String>,
}

/// Columns as read from disk, before any normalization.
#[derive(Debug, Default)]
struct RawColumns {
    rows: usize,
    numeric: BTreeMap<String, Vec<f64>>,
    time: Option<(String, Vec<Option<NaiveDateTime>>)>,
    skipped: Vec<String>,
}

impl RawColumns {
    fn window(mut self, offset: usize, limit: Option<usize>) -> Self {
        let start = offset.min(self.rows);
        let end = limit.map_or(self.rows, |l| start.saturating_add(l).min(self.rows));
        if start == 0 && end == self.rows {
            return self;
        }
        for values in self.numeric.values_mut() {
            *values = values[start..end].to_vec();
        }
        if let Some((_, ts)) = self.time.as_mut() {
            *ts = ts[start..end].to_vec();
        }
        self.rows = end - start;
        self
    }
}

// ─── Public entry points ────────────────────────────────────────────

pub fn load_table(path: &Path, opts: &LoadOptions) -> Result<LoadedTable, LoadError> {
    let raw = read_columns(path)?.window(opts.offset, opts.limit);
    if raw.rows == 0 {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    for col in &raw.skipped {
        warn!(column = %col, "skipping non-numeric column");
    }

    let mut table = PriceTable::from_columns(raw.numeric, opts.convention)?;
    if let Some(column) = opts.regime_column.as_deref() {
        table = table.with_regime_column(column)?;
    }

    let mut time_column = None;
    if let Some((name, stamps)) = raw.time {
        let parsed: Option<Vec<NaiveDateTime>> = stamps.into_iter().collect();
        match parsed {
            Some(ts) => {
                table = table.with_timestamps(ts)?;
                time_column = Some(name);
            }
            None => warn!(
                column = %name,
                "time column has unparseable values; hold times will be reported in bars"
            ),
        }
    }

    let dataset_hash = table.content_hash();
    let short_hash = &dataset_hash[..12];
    info!(
        path = %path.display(),
        rows = table.len(),
        signals = table.signal_count(),
        convention = ?table.convention(),
        hash = %short_hash,
        "loaded price table"
    );

    Ok(LoadedTable {
        table,
        path: path.to_path_buf(),
        dataset_hash,
        time_column,
        skipped_columns: raw.skipped,
    })
}

/// Result of a preflight check on a price file.
#[derive(Debug, Clone, PartialEq)]
pub struct PreflightReport {
    pub rows: usize,
    pub has_close: bool,
    pub time_column: Option<String>,
    pub signal_columns: Vec<String>,
    pub problems: Vec<String>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Inspect a price file without building a table.
///
/// Problems are collected, not raised; only an unreadable file is an error.
/// A regime column, when given, must be present and is not counted as a signal.
pub fn preflight(path: &Path, regime_column: Option<&str>) -> Result<PreflightReport, LoadError> {
    let raw = read_columns(path)?;
    let has_close = raw.numeric.contains_key("close");
    let regime = regime_column.map(normalize_name);
    let is_regime = |column: &str| {
        regime.as_deref().is_some_and(|r| {
            column == r
                || column.strip_suffix("_signal") == Some(r)
                || r.strip_suffix("_signal") == Some(column)
        })
    };
    let signal_columns: Vec<String> = raw
        .numeric
        .keys()
        .filter(|k| !combolab_core::table::RESERVED_COLUMNS.contains(&k.as_str()))
        .filter(|k| !is_regime(k.as_str()))
        .cloned()
        .collect();

    let mut problems = Vec::new();
    if let Some(r) = regime.as_deref() {
        if !raw.numeric.keys().any(|k| is_regime(k.as_str())) {
            problems.push(format!("regime column '{r}' not found"));
        }
    }
    if raw.rows == 0 {
        problems.push("file has no rows".to_string());
    }
    if !has_close {
        problems.push("missing required column 'close'".to_string());
    }
    match &raw.time {
        None => problems.push(format!(
            "no time column (expected one of: {})",
            TIME_COLUMNS.join(", ")
        )),
        Some((name, ts)) => {
            let bad = ts.iter().filter(|t| t.is_none()).count();
            if bad > 0 {
                problems.push(format!("{bad} unparseable values in time column '{name}'"));
            } else if ts.windows(2).any(|w| w[0] >= w[1]) {
                problems.push(format!("time column '{name}' is not strictly increasing"));
            }
        }
    }
    if signal_columns.is_empty() {
        problems.push("no signal columns".to_string());
    }

    Ok(PreflightReport {
        rows: raw.rows,
        has_close,
        time_column: raw.time.map(|(name, _)| name),
        signal_columns,
        problems,
    })
}

// ─── Readers ────────────────────────────────────────────────────────

fn read_columns(path: &Path) -> Result<RawColumns, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        "parquet" | "pq" => read_parquet(path),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn pick_time_column(names: &[String]) -> Option<String> {
    TIME_COLUMNS
        .iter()
        .find(|c| names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
}

fn read_csv(path: &Path) -> Result<RawColumns, LoadError> {
    let file = fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers: Vec<String> = rdr.headers()?.iter().map(normalize_name).collect();
    let time_col = pick_time_column(&headers);

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in rdr.records() {
        let record = record?;
        for (i, cell) in record.iter().enumerate().take(headers.len()) {
            cells[i].push(cell.trim().to_string());
        }
    }

    let mut raw = RawColumns {
        rows: cells.first().map_or(0, Vec::len),
        ..Default::default()
    };

    for (name, column) in headers.into_iter().zip(cells) {
        if Some(&name) == time_col.as_ref() {
            let ts = column.iter().map(|c| parse_timestamp(c)).collect();
            raw.time = Some((name, ts));
            continue;
        }
        if raw.numeric.contains_key(&name) {
            continue;
        }
        match parse_numeric_column(&column) {
            Some(values) => {
                raw.numeric.insert(name, values);
            }
            None => raw.skipped.push(name),
        }
    }
    Ok(raw)
}

/// `None` when no non-empty cell parses as a number.
fn parse_numeric_column(cells: &[String]) -> Option<Vec<f64>> {
    let mut any_numeric = false;
    let values: Vec<f64> = cells
        .iter()
        .map(|c| match c.parse::<f64>() {
            Ok(v) => {
                any_numeric = true;
                v
            }
            Err(_) => parse_bool(c).unwrap_or(f64::NAN),
        })
        .collect();
    let any_bool = cells.iter().any(|c| parse_bool(c).is_some());
    (any_numeric || any_bool || cells.iter().all(|c| c.is_empty())).then_some(values)
}

fn parse_bool(cell: &str) -> Option<f64> {
    match cell {
        "true" | "True" | "TRUE" => Some(1.0),
        "false" | "False" | "FALSE" => Some(0.0),
        _ => None,
    }
}

fn read_parquet(path: &Path) -> Result<RawColumns, LoadError> {
    let file = fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| LoadError::Parquet(format!("read: {e}")))?;

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| normalize_name(n.as_str()))
        .collect();
    let time_col = pick_time_column(&names);

    let mut raw = RawColumns {
        rows: df.height(),
        ..Default::default()
    };

    for (name, column) in names.into_iter().zip(df.get_columns()) {
        if Some(&name) == time_col.as_ref() {
            raw.time = Some((name, parquet_timestamps(column)?));
            continue;
        }
        if raw.numeric.contains_key(&name) {
            continue;
        }
        let Ok(cast) = column.cast(&DataType::Float64) else {
            raw.skipped.push(name);
            continue;
        };
        let ca = cast
            .f64()
            .map_err(|e| LoadError::Parquet(format!("column '{name}': {e}")))?;
        if ca.len() > 0 && ca.null_count() == ca.len() && column.null_count() < column.len() {
            raw.skipped.push(name);
            continue;
        }
        let values: Vec<f64> = ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        raw.numeric.insert(name, values);
    }
    Ok(raw)
}

fn parquet_timestamps(column: &Column) -> Result<Vec<Option<NaiveDateTime>>, LoadError> {
    let map_err = |e: PolarsError| LoadError::Parquet(format!("time column: {e}"));

    match column.dtype() {
        DataType::String => {
            let ca = column.str().map_err(map_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.and_then(parse_timestamp))
                .collect())
        }
        DataType::Datetime(unit, _) => {
            let per_ms: i64 = match unit {
                TimeUnit::Milliseconds => 1,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Nanoseconds => 1_000_000,
            };
            let ints = column.cast(&DataType::Int64).map_err(map_err)?;
            let ca = ints.i64().map_err(map_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.and_then(|raw| from_epoch_millis(raw / per_ms)))
                .collect())
        }
        _ => {
            let floats = column.cast(&DataType::Float64).map_err(map_err)?;
            let ca = floats.f64().map_err(map_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.and_then(from_epoch_number))
                .collect())
        }
    }
}

// ─── Timestamp parsing ──────────────────────────────────────────────

fn from_epoch_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Epoch number → datetime: above 1e12 is milliseconds, above 1e9 seconds.
fn from_epoch_number(v: f64) -> Option<NaiveDateTime> {
    if !v.is_finite() {
        return None;
    }
    if v > 1e12 {
        from_epoch_millis(v as i64)
    } else if v > 1e9 {
        DateTime::from_timestamp(v as i64, 0).map(|dt| dt.naive_utc())
    } else {
        None
    }
}

/// Parse a timestamp cell: epoch ms, epoch s, or a datetime string.
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(v) = cell.parse::<f64>() {
        return from_epoch_number(v);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.naive_utc());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    const CSV: &str = "\
open_time,Open,High,Low,Close,Volume,rsi_signal,macd_signal,symbol
1704067200000,100,101,99,100,5,0,1,BTCUSDT
1704067260000,100,102,99,101,5,1,1,BTCUSDT
1704067320000,101,101,98,99,5,1,-1,BTCUSDT
1704067380000,99,106,99,105,5,-1,0,BTCUSDT
";

    #[test]
    fn parse_timestamp_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("1704067200000"), Some(expected));
        assert_eq!(parse_timestamp("1704067200"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("12345"), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn load_csv_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", CSV);
        let loaded = load_table(&path, &LoadOptions::default()).unwrap();

        assert_eq!(loaded.table.len(), 4);
        assert_eq!(loaded.table.close(), &[100.0, 101.0, 99.0, 105.0]);
        assert_eq!(loaded.time_column.as_deref(), Some("open_time"));
        assert_eq!(loaded.skipped_columns, vec!["symbol".to_string()]);
        assert_eq!(loaded.table.signal("rsi"), Some(&[0.0, 1.0, 1.0, -1.0][..]));
        assert!(loaded.table.timestamps().is_some());
        let names: Vec<&str> = loaded.table.signal_names().collect();
        assert_eq!(names, vec!["macd", "rsi"]);
        assert_eq!(loaded.dataset_hash.len(), 64);
    }

    #[test]
    fn row_window_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", CSV);
        let opts = LoadOptions {
            offset: 1,
            limit: Some(2),
            ..Default::default()
        };
        let loaded = load_table(&path, &opts).unwrap();
        assert_eq!(loaded.table.close(), &[101.0, 99.0]);
        assert_eq!(loaded.table.timestamps().unwrap().len(), 2);
    }

    #[test]
    fn window_past_end_is_empty_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", CSV);
        let opts = LoadOptions {
            offset: 10,
            ..Default::default()
        };
        assert!(matches!(
            load_table(&path, &opts),
            Err(LoadError::Empty { .. })
        ));
    }

    #[test]
    fn missing_close_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", "time,rsi_signal\n1704067200,1\n");
        let err = load_table(&path, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Table(TableError::MissingClose)));
    }

    #[test]
    fn unparseable_cells_become_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", "close,rsi\n100,1\n101,\n102,n/a\n");
        let loaded = load_table(&path, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.table.signal("rsi"), Some(&[1.0, 0.0, 0.0][..]));
        assert!(loaded.time_column.is_none());
    }

    #[test]
    fn string_timestamps_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "prices.csv",
            "timestamp,close\n2024-01-01 00:00:00,1\n2024-01-01 00:01:00,2\n",
        );
        let loaded = load_table(&path, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.time_column.as_deref(), Some("timestamp"));
    }

    #[test]
    fn bad_timestamps_are_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", "time,close\nfoo,1\nbar,2\n");
        let loaded = load_table(&path, &LoadOptions::default()).unwrap();
        assert!(loaded.time_column.is_none());
        assert!(loaded.table.timestamps().is_none());
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.xlsx", "");
        assert!(matches!(
            load_table(&path, &LoadOptions::default()),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn parquet_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.parquet");
        let mut df = DataFrame::new(vec![
            Column::new("open_time".into(), vec![1_704_067_200_000i64, 1_704_067_260_000]),
            Column::new("close".into(), vec![100.0, 101.0]),
            Column::new("rsi_signal".into(), vec![1.0, -1.0]),
            Column::new("symbol".into(), vec!["BTCUSDT", "BTCUSDT"]),
        ])
        .unwrap();
        let file = fs::File::create(&path).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();

        let loaded = load_table(&path, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.table.close(), &[100.0, 101.0]);
        assert_eq!(loaded.table.signal("rsi"), Some(&[1.0, -1.0][..]));
        assert_eq!(loaded.time_column.as_deref(), Some("open_time"));
        assert_eq!(loaded.skipped_columns, vec!["symbol".to_string()]);
    }

    #[test]
    fn preflight_flags_problems() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(&dir, "good.csv", CSV);
        let report = preflight(&good, None).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.rows, 4);
        assert!(report.signal_columns.contains(&"rsi_signal".to_string()));

        let bad = write_file(&dir, "bad.csv", "price,foo\n1,2\n");
        let report = preflight(&bad, None).unwrap();
        assert!(!report.has_close);
        assert!(report.problems.iter().any(|p| p.contains("close")));
        assert!(report.problems.iter().any(|p| p.contains("time column")));
    }

    #[test]
    fn regime_column_is_not_a_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prices.csv", CSV);
        let opts = LoadOptions {
            regime_column: Some("macd".into()),
            ..Default::default()
        };
        let loaded = load_table(&path, &opts).unwrap();
        assert_eq!(loaded.table.signal_names().collect::<Vec<_>>(), vec!["rsi"]);
        assert_eq!(loaded.table.regime(), Some(("macd", &[1.0, 1.0, -1.0, 0.0][..])));

        let opts = LoadOptions {
            regime_column: Some("ma200_up".into()),
            ..Default::default()
        };
        let err = load_table(&path, &opts).unwrap_err();
        assert!(matches!(err, LoadError::Table(TableError::MissingRegime(_))));

        let report = preflight(&path, Some("macd_signal")).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.signal_columns, vec!["rsi_signal".to_string()]);

        let report = preflight(&path, Some("ma200_up")).unwrap();
        assert!(report.problems.iter().any(|p| p.contains("ma200_up")));
    }

    #[test]
    fn preflight_detects_unsorted_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "prices.csv",
            "time,close,rsi\n1704067260,1,1\n1704067200,2,1\n",
        );
        let report = preflight(&path, None).unwrap();
        assert!(report.problems.iter().any(|p| p.contains("increasing")));
    }
}
