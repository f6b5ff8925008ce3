//! Fit output directory: `fit_<timestamp>_<label>` under the work dir, with
//! copies of the run inputs so a directory is self-describing.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::domain::RunConfig;
use crate::error::AppError;

pub const RUN_CONFIG_FILE: &str = "run_config.json";

/// Create `workdir/fit_<YYYY-mm-dd_HH-MM-SS>_<label>` and return its path.
pub fn create_fit_dir(workdir: &Path, label: &str, now: DateTime<Local>) -> Result<PathBuf, AppError> {
    let stamp = now.format("%Y-%m-%d_%H-%M-%S");
    let dir = workdir.join(format!("fit_{stamp}_{}", sanitize_label(label)));
    fs::create_dir_all(&dir).map_err(|e| {
        AppError::io(format!("Failed to create fit dir '{}': {e}", dir.display()))
    })?;
    Ok(dir)
}

/// Copy `file` into `dir`, keeping its file name.
pub fn copy_into(dir: &Path, file: &Path) -> Result<PathBuf, AppError> {
    let name = file
        .file_name()
        .ok_or_else(|| AppError::io(format!("'{}' has no file name.", file.display())))?;
    let dest = dir.join(name);
    fs::copy(file, &dest).map_err(|e| {
        AppError::io(format!(
            "Failed to copy '{}' into '{}': {e}",
            file.display(),
            dir.display()
        ))
    })?;
    Ok(dest)
}

pub fn write_run_config(dir: &Path, config: &RunConfig) -> Result<PathBuf, AppError> {
    let path = dir.join(RUN_CONFIG_FILE);
    let file = File::create(&path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, config)
        .map_err(|e| AppError::io(format!("Failed to write run config: {e}")))?;
    Ok(path)
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
