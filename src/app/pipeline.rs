//! Batch fit pipeline shared by the CLI and the integration tests.
//!
//! parameter table -> sources -> fit dir -> clip controller per dataset
//! -> results.csv / lsq_res.txt
//!
//! The CLI only gathers inputs and prints; everything that touches the
//! collaborators lives here.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::domain::{ParameterTable, ParameterVector, RunConfig, SamplerKind};
use crate::error::AppError;
use crate::fit::{BatchResults, BatchRunner, ClipController, LinearLeastSquares};
use crate::io::{CsvLoader, copy_into, create_fit_dir, discover_sources, write_channel_table, write_results_csv, write_run_config};
use crate::sample::MetropolisSampler;

pub const RESULTS_FILE: &str = "results.csv";
pub const CHANNEL_TABLE_FILE: &str = "lsq_res.txt";

/// Where the datasets of a run come from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Every file with the extension in the directory, naturally sorted.
    Dir { dir: PathBuf, ext: String },
    /// Explicit files, in the given order.
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub params_path: PathBuf,
    pub sources: SourceSpec,
    pub workdir: PathBuf,
    /// Free parameter written to the per-channel table.
    pub report_index: usize,
    pub config: RunConfig,
}

/// All outputs of one `clipfit run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub fit_dir: PathBuf,
    pub labels: Vec<String>,
    pub results: BatchResults,
}

/// Free-parameter labels for a parameter table expanded to `nvisit` visits.
pub fn labels_for(params_path: &Path, nvisit: usize) -> Result<Vec<String>, AppError> {
    let table = ParameterTable::read_csv(params_path)?;
    Ok(ParameterVector::build(&table, nvisit)?.labels())
}

pub fn run_batch(request: &BatchRequest) -> Result<RunOutput, AppError> {
    let config = &request.config;
    config.validate()?;
    if config.run_nested {
        return Err(AppError::input(format!(
            "{} sampling requested but no {} sampler is available.",
            SamplerKind::Nested,
            SamplerKind::Nested
        )));
    }

    // 1) Parameters.
    let table = ParameterTable::read_csv(&request.params_path)?;
    let params = ParameterVector::build(&table, config.nvisit)?;
    let labels = params.labels();

    // 2) Sources, in batch order.
    let paths = match &request.sources {
        SourceSpec::Dir { dir, ext } => discover_sources(dir, ext)?,
        SourceSpec::Files(files) if files.is_empty() => {
            return Err(AppError::input("No light-curve files given."));
        }
        SourceSpec::Files(files) => files.clone(),
    };
    let sources: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();

    // 3) Fit directory with the run inputs.
    let fit_dir = create_fit_dir(&request.workdir, &config.label, Local::now())?;
    copy_into(&fit_dir, &request.params_path)?;
    write_run_config(&fit_dir, config)?;
    info!(
        fit_dir = %fit_dir.display(),
        datasets = sources.len(),
        free_params = params.n_free(),
        "starting batch"
    );

    // 4) Clip-and-refit every dataset.
    let loader = CsvLoader;
    let fitter = LinearLeastSquares;
    let mcmc = MetropolisSampler::new(Some(fit_dir.clone()));
    let controller = ClipController::new(config, &params, &loader, &fitter)?.with_sampler(&mcmc);
    let results = BatchRunner::new(controller).run(&sources);

    // 5) Reports.
    write_results_csv(&fit_dir.join(RESULTS_FILE), &results, &labels)?;
    if request.report_index < labels.len() {
        write_channel_table(
            &fit_dir.join(CHANNEL_TABLE_FILE),
            &results,
            request.report_index,
        )?;
    }

    if results.succeeded() == 0 {
        let first = results
            .failures()
            .next()
            .map(|(_, err)| err.clone())
            .unwrap_or_else(|| AppError::input("No datasets were fitted."));
        return Err(first);
    }

    Ok(RunOutput {
        fit_dir,
        labels,
        results,
    })
}
