//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs the tracing subscriber
//! - dispatches to the run / labels / simulate handlers

use clap::Parser;

use crate::cli::{Cli, Command, LabelsArgs, RunArgs, SimulateArgs};
use crate::data::SyntheticSpec;
use crate::domain::RunConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `clipfit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is normal.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Labels(args) => handle_labels(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let request = batch_request_from_args(&args);
    let output = pipeline::run_batch(&request)?;

    println!(
        "{}",
        crate::report::format_batch_summary(&output.results, &output.labels, &request.config)
    );
    println!("Results written to {}", output.fit_dir.display());
    Ok(())
}

fn handle_labels(args: LabelsArgs) -> Result<(), AppError> {
    for label in pipeline::labels_for(&args.params, args.nvisit)? {
        println!("{label}");
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spec = SyntheticSpec {
        n_channels: args.channels,
        points_per_visit: args.points,
        nvisit: args.nvisit,
        outliers: args.outliers,
        outlier_sigma: args.outlier_sigma,
        noise: args.noise,
        seed: args.seed,
        ..SyntheticSpec::default()
    };
    let paths = crate::data::write_synthetic(&args.out, &spec)?;
    println!(
        "Wrote {} channel file(s) and {} to {}",
        paths.len(),
        crate::data::PARAM_FILE,
        args.out.display()
    );
    Ok(())
}

pub fn run_config_from_args(args: &RunArgs) -> RunConfig {
    RunConfig {
        label: args.label.clone(),
        nvisit: args.nvisit,
        max_clip_iters: args.clip_iters,
        clip_sigma: args.clip_sigma,
        functions: args.functions.clone(),
        run_mcmc: args.mcmc,
        run_nested: args.nested,
        mcmc_steps: args.mcmc_steps,
        mcmc_burn: args.mcmc_burn,
        seed: args.seed,
        parallel: args.parallel,
    }
}

pub fn batch_request_from_args(args: &RunArgs) -> pipeline::BatchRequest {
    let sources = match &args.dir {
        Some(dir) => pipeline::SourceSpec::Dir {
            dir: dir.clone(),
            ext: args.ext.clone(),
        },
        None => pipeline::SourceSpec::Files(args.files.clone()),
    };
    pipeline::BatchRequest {
        params_path: args.params.clone(),
        sources,
        workdir: args.workdir.clone(),
        report_index: args.report_index,
        config: run_config_from_args(args),
    }
}
