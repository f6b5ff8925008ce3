//! Result exports.
//!
//! - `results.csv`: one row per (dataset, reported parameter), easy to load in
//!   spreadsheets or downstream scripts
//! - `lsq_res.txt`: fixed-width table of one parameter across channels
//! - light-curve writer used by the synthetic data generator

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::Dataset;
use crate::error::AppError;
use crate::fit::BatchResults;

/// Write per-dataset, per-parameter results to a CSV file.
///
/// Failed datasets get a single row with the error message so positions stay
/// visible.
pub fn write_results_csv(path: &Path, results: &BatchResults, labels: &[String]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writer
        .write_record([
            "position",
            "source",
            "parameter",
            "value",
            "error",
            "n_clipped",
            "termination",
            "chi2red",
            "error_message",
        ])
        .map_err(|e| AppError::io(format!("Failed to write export CSV header: {e}")))?;

    for entry in &results.entries {
        let position = entry.position.to_string();
        match &entry.outcome {
            Ok(outcome) => {
                for (k, label) in labels.iter().enumerate() {
                    let Some((value, error)) = outcome.summary.reported(k) else {
                        continue;
                    };
                    writer
                        .write_record([
                            position.as_str(),
                            entry.source.as_str(),
                            label.as_str(),
                            &format!("{value:.10e}"),
                            &format!("{error:.10e}"),
                            &outcome.clipped.len().to_string(),
                            outcome.termination.display_name(),
                            &format!("{:.6}", outcome.chi2red),
                            "",
                        ])
                        .map_err(|e| AppError::io(format!("Failed to write export CSV row: {e}")))?;
                }
            }
            Err(err) => {
                writer
                    .write_record([
                        position.as_str(),
                        entry.source.as_str(),
                        "",
                        "",
                        "",
                        "",
                        "failed",
                        "",
                        &err.to_string(),
                    ])
                    .map_err(|e| AppError::io(format!("Failed to write export CSV row: {e}")))?;
            }
        }
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush export CSV: {e}")))
}

/// Write the `k`-th reported parameter of every successful dataset as a
/// fixed-width table: channel key, value, error, slot index.
pub fn write_channel_table(path: &Path, results: &BatchResults, k: usize) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;

    for entry in &results.entries {
        let Ok(outcome) = &entry.outcome else {
            continue;
        };
        let (Some((value, error)), Some(slot)) =
            (outcome.summary.reported(k), outcome.summary.indices.get(k))
        else {
            continue;
        };
        let key = channel_key(&entry.source)
            .map(|v| v.to_string())
            .unwrap_or_else(|| entry.position.to_string());
        writeln!(file, "{key: <10} {value: <25} {error: <25} {slot: <25}")
            .map_err(|e| AppError::io(format!("Failed to write channel table row: {e}")))?;
    }
    Ok(())
}

/// Trailing number of a source's file stem (`speclc1.125.txt` → 1.125).
pub fn channel_key(source: &str) -> Option<f64> {
    let stem = Path::new(source).file_stem()?.to_str()?;
    let start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, _)| i)?;
    stem[start..].trim_start_matches('.').parse().ok()
}

/// Write a dataset as a comma-separated light curve with a header row.
pub fn write_light_curve(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    writer
        .write_record(["t", "y", "err", "visit"])
        .map_err(|e| AppError::io(format!("Failed to write light curve header: {e}")))?;
    for i in 0..dataset.len() {
        writer
            .write_record([
                format!("{:.8}", dataset.t()[i]),
                format!("{:.10}", dataset.y()[i]),
                format!("{:.10}", dataset.err()[i]),
                dataset.visit()[i].to_string(),
            ])
            .map_err(|e| AppError::io(format!("Failed to write light curve row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{}': {e}", path.display())))
}
