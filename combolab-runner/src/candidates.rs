//! Candidate strategy files.
//!
//! A candidate file is a CSV with a `Combination` column holding one JSON
//! object (or Python dict literal) per row. Rows that fail to parse are kept
//! as [`CandidateFailure`]s so that one bad row never sinks a whole batch.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use combolab_core::WeightedCombination;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COMBINATION_COLUMN: &str = "Combination";

#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no '{COMBINATION_COLUMN}' column{hint}")]
    MissingColumn { hint: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Zero-based row position in the source file.
    pub index: usize,
    pub combination: WeightedCombination,
}

/// A candidate that could not be evaluated, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub index: usize,
    pub raw: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<CandidateFailure>,
}

impl CandidateSet {
    pub fn from_combinations(combos: impl IntoIterator<Item = WeightedCombination>) -> Self {
        Self {
            candidates: combos
                .into_iter()
                .enumerate()
                .map(|(index, combination)| Candidate { index, combination })
                .collect(),
            failures: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn load_candidates(path: &Path) -> Result<CandidateSet, CandidateError> {
    let file = fs::File::open(path).map_err(|source| CandidateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_candidates(file)
}

pub fn parse_candidates<R: Read>(reader: R) -> Result<CandidateSet, CandidateError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let col = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(COMBINATION_COLUMN))
        .ok_or_else(|| {
            let hint = if headers.iter().any(|h| h.trim().eq_ignore_ascii_case("strategy")) {
                " (found 'strategy'; rename it to 'Combination')".to_string()
            } else {
                String::new()
            };
            CandidateError::MissingColumn { hint }
        })?;

    let mut set = CandidateSet::default();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        let raw = record.get(col).unwrap_or("").trim().to_string();
        match WeightedCombination::parse(&raw) {
            Ok(combination) => set.candidates.push(Candidate { index, combination }),
            Err(e) => set.failures.push(CandidateFailure {
                index,
                raw,
                error: e.to_string(),
            }),
        }
    }
    Ok(set)
}
