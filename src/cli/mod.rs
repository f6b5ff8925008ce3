//! Command-line parsing for the sigma-clip fitter.
//!
//! Argument parsing and command dispatch stay separate from the fitting code;
//! `app` turns these structs into a `RunConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::ModelFunction;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "clipfit",
    version,
    about = "Iterative sigma-clip least-squares fitting of light-curve batches"
)]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "CLIPFIT_LOG_LEVEL")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every dataset, clipping outliers, and write results into a fit directory.
    Run(RunArgs),
    /// Print the labels of the free parameters for a parameter table.
    Labels(LabelsArgs),
    /// Write synthetic channel files (with outliers) and a parameter table.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Parameter table (CSV: parameter,value,fixed,tied).
    #[arg(long, value_name = "CSV", env = "CLIPFIT_PARAMS")]
    pub params: PathBuf,

    /// Directory of light-curve files (naturally sorted).
    #[arg(long, value_name = "DIR", conflicts_with = "files", env = "CLIPFIT_DATA_DIR")]
    pub dir: Option<PathBuf>,

    /// Explicit light-curve files, fitted in the given order.
    #[arg(long, value_name = "FILE", num_args = 1.., required_unless_present = "dir")]
    pub files: Vec<PathBuf>,

    /// Extension of light-curve files when scanning `--dir`.
    #[arg(long, default_value = "txt")]
    pub ext: String,

    /// Where the `fit_<timestamp>_<label>` directory is created.
    #[arg(long, default_value = ".", env = "CLIPFIT_WORKDIR")]
    pub workdir: PathBuf,

    /// Run label (also used in the fit directory name).
    #[arg(long, default_value = "run")]
    pub label: String,

    /// Number of visits in every dataset.
    #[arg(long, default_value_t = 1)]
    pub nvisit: usize,

    /// Maximum outlier-detecting fits per dataset (0 disables clipping).
    #[arg(long = "clip-iters", default_value_t = 2, env = "CLIPFIT_CLIP_ITERS")]
    pub clip_iters: usize,

    /// Outlier threshold in units of the point uncertainty.
    #[arg(long = "clip-sigma", default_value_t = 3.0, env = "CLIPFIT_CLIP_SIGMA")]
    pub clip_sigma: f64,

    /// Model functions to enable.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [ModelFunction::Constant, ModelFunction::Polynomial]
    )]
    pub functions: Vec<ModelFunction>,

    /// Run the Metropolis sampler after clipping.
    #[arg(long)]
    pub mcmc: bool,

    /// Request nested sampling after clipping (needs a nested sampler).
    #[arg(long)]
    pub nested: bool,

    #[arg(long = "mcmc-steps", default_value_t = 5_000)]
    pub mcmc_steps: usize,

    #[arg(long = "mcmc-burn", default_value_t = 1_000)]
    pub mcmc_burn: usize,

    /// Seed for the samplers.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fit datasets in parallel (results keep input order).
    #[arg(long, env = "CLIPFIT_PARALLEL")]
    pub parallel: bool,

    /// Free parameter (0-based, in label order) written to `lsq_res.txt`.
    #[arg(long = "report-index", default_value_t = 1)]
    pub report_index: usize,
}

#[derive(Debug, Args, Clone)]
pub struct LabelsArgs {
    /// Parameter table (CSV: parameter,value,fixed,tied).
    #[arg(long, value_name = "CSV")]
    pub params: PathBuf,

    #[arg(long, default_value_t = 1)]
    pub nvisit: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output directory for channel files and `fit_par.csv`.
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    #[arg(long, default_value_t = 5)]
    pub channels: usize,

    #[arg(long, default_value_t = 60)]
    pub points: usize,

    #[arg(long, default_value_t = 1)]
    pub nvisit: usize,

    /// Outliers injected per channel.
    #[arg(long, default_value_t = 2)]
    pub outliers: usize,

    /// Outlier distance from the truth, in uncertainties.
    #[arg(long = "outlier-sigma", default_value_t = 12.0)]
    pub outlier_sigma: f64,

    /// Per-point uncertainty relative to the baseline flux.
    #[arg(long, default_value_t = 2e-4)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
