//! Light-curve ingest.
//!
//! Turns one text file per channel into a [`Dataset`]:
//!
//! ```text
//! # t, y, err, visit
//! 0.000, 1.0012, 0.0004, 0
//! 0.002  1.0009  0.0004  0
//! ```
//!
//! - Columns: `t`, `y`, `err`, optional `visit` (default 0).
//! - Comma *or* whitespace separated; `#` starts a comment line.
//! - An optional header row is skipped (a first row whose `t` is not numeric).
//! - Rows are kept in file order; that order is the original index frame.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{CumulativeClip, Dataset, ParameterVector, RunConfig};
use crate::error::AppError;

/// Loads the dataset for a source with the given original-frame rows removed.
pub trait DatasetLoader: Send + Sync {
    fn load(
        &self,
        source: &str,
        config: &RunConfig,
        params: &ParameterVector,
        exclude: &CumulativeClip,
    ) -> Result<Dataset, AppError>;
}

/// Reads each source as a light-curve file on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvLoader;

impl DatasetLoader for CsvLoader {
    fn load(
        &self,
        source: &str,
        config: &RunConfig,
        _params: &ParameterVector,
        exclude: &CumulativeClip,
    ) -> Result<Dataset, AppError> {
        let dataset = read_light_curve(Path::new(source))?;
        check_visits(&dataset, config.nvisit)?;
        dataset.excluding(exclude)
    }
}

/// Serves datasets already held in memory (keyed by source).
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    datasets: HashMap<String, Dataset>,
}

impl MemoryLoader {
    pub fn from_datasets(datasets: impl IntoIterator<Item = Dataset>) -> Self {
        Self {
            datasets: datasets
                .into_iter()
                .map(|d| (d.source().to_string(), d))
                .collect(),
        }
    }

    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.source().to_string(), dataset);
    }
}

impl DatasetLoader for MemoryLoader {
    fn load(
        &self,
        source: &str,
        config: &RunConfig,
        _params: &ParameterVector,
        exclude: &CumulativeClip,
    ) -> Result<Dataset, AppError> {
        let dataset = self
            .datasets
            .get(source)
            .ok_or_else(|| AppError::input(format!("Unknown source '{source}'.")))?;
        check_visits(dataset, config.nvisit)?;
        dataset.excluding(exclude)
    }
}

fn check_visits(dataset: &Dataset, nvisit: usize) -> Result<(), AppError> {
    if dataset.n_visits() > nvisit {
        return Err(AppError::input(format!(
            "'{}' has {} visit(s) but the run is configured for {nvisit}.",
            dataset.source(),
            dataset.n_visits()
        )));
    }
    Ok(())
}

/// Read a light-curve file into an unclipped dataset.
pub fn read_light_curve(path: &Path) -> Result<Dataset, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::io(format!("Failed to open light curve '{}': {e}", path.display()))
    })?;
    parse_light_curve(&path.display().to_string(), &text)
}

/// Parse light-curve text; `source` names the dataset in errors.
pub fn parse_light_curve(source: &str, text: &str) -> Result<Dataset, AppError> {
    // Whitespace-separated files are rewritten to CSV so one reader handles both.
    let normalized: String = text
        .lines()
        .map(|line| {
            // Excel and friends sometimes emit a BOM on the first line.
            let line = line.trim().trim_start_matches('\u{feff}');
            if line.contains(',') || line.starts_with('#') {
                line.to_string()
            } else {
                line.split_whitespace().collect::<Vec<_>>().join(",")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(normalized.as_bytes());

    let mut t = Vec::new();
    let mut y = Vec::new();
    let mut err = Vec::new();
    let mut visit = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| AppError::input(format!("'{source}': CSV parse error: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if idx == 0 && is_header(&record) {
            continue;
        }
        let row = idx + 1;
        if record.len() < 3 {
            return Err(AppError::input(format!(
                "'{source}' row {row}: expected at least 3 columns (t, y, err), got {}.",
                record.len()
            )));
        }
        t.push(parse_f64(&record, 0, source, row)?);
        y.push(parse_f64(&record, 1, source, row)?);
        err.push(parse_f64(&record, 2, source, row)?);
        visit.push(match record.get(3) {
            Some(raw) if !raw.is_empty() => parse_visit(raw, source, row)?,
            _ => 0,
        });
    }

    Dataset::new(source, t, y, err, visit)
}

fn is_header(record: &StringRecord) -> bool {
    record.get(0).is_some_and(|f| f.parse::<f64>().is_err())
}

fn parse_f64(record: &StringRecord, col: usize, source: &str, row: usize) -> Result<f64, AppError> {
    let raw = record.get(col).unwrap_or("");
    raw.parse::<f64>().map_err(|_| {
        AppError::input(format!(
            "'{source}' row {row}: column {} is not a number ('{raw}').",
            col + 1
        ))
    })
}

fn parse_visit(raw: &str, source: &str, row: usize) -> Result<usize, AppError> {
    if let Ok(v) = raw.parse::<usize>() {
        return Ok(v);
    }
    // Some writers store integer columns as floats ("1.0").
    match raw.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(AppError::input(format!(
            "'{source}' row {row}: invalid visit index '{raw}'."
        ))),
    }
}
