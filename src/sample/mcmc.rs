//! Random-walk Metropolis sampler over the free parameters.
//!
//! The chain starts at the least-squares solution and proposes Gaussian
//! steps sized from the least-squares uncertainties (scaled by the usual
//! `2.38 / sqrt(d)` factor). The likelihood is Gaussian with the dataset's
//! (already rescaled) uncertainties and flat priors.
//!
//! Output: a JSON summary per source with the median and the 16th/84th
//! percentiles of each free parameter.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use serde::Serialize;
use tracing::info;

use crate::domain::{Dataset, FitResult, ParameterVector, RunConfig, SamplerKind};
use crate::error::AppError;
use crate::math::{median_mut, percentile_sorted};
use crate::models::Model;
use crate::sample::Sampler;

#[derive(Debug, Clone, Serialize)]
pub struct ParamPosterior {
    pub label: String,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub source: String,
    pub steps: usize,
    pub burn: usize,
    pub acceptance: f64,
    pub params: Vec<ParamPosterior>,
}

/// Metropolis sampler writing `mcmc_<source stem>.json` into `out_dir`
/// (nothing is written when `out_dir` is `None`).
#[derive(Debug, Clone, Default)]
pub struct MetropolisSampler {
    out_dir: Option<PathBuf>,
}

impl MetropolisSampler {
    pub fn new(out_dir: Option<PathBuf>) -> Self {
        Self { out_dir }
    }
}

impl Sampler for MetropolisSampler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Mcmc
    }

    fn run(
        &self,
        dataset: &Dataset,
        model: &Model,
        fit: &FitResult,
        source: &str,
        config: &RunConfig,
        params: &ParameterVector,
    ) -> Result<(), AppError> {
        let summary = run_chain(dataset, model, fit, params, config, source)?;
        info!(
            source,
            acceptance = summary.acceptance,
            "MCMC chain finished"
        );
        if let Some(dir) = &self.out_dir {
            let path = dir.join(format!("mcmc_{}.json", source_stem(source)));
            write_summary(&path, &summary)?;
        }
        Ok(())
    }
}

/// Run one chain and summarise the post-burn samples.
pub fn run_chain(
    dataset: &Dataset,
    model: &Model,
    fit: &FitResult,
    params: &ParameterVector,
    config: &RunConfig,
    source: &str,
) -> Result<ChainSummary, AppError> {
    let free = params.free_indices();
    if free.is_empty() {
        return Err(AppError::Sampler(format!(
            "'{source}': nothing to sample (no free parameters)."
        )));
    }
    if config.mcmc_steps <= config.mcmc_burn {
        return Err(AppError::Sampler(format!(
            "'{source}': mcmc_steps must exceed mcmc_burn."
        )));
    }

    let mut rng = StdRng::seed_from_u64(chain_seed(config.seed, source));
    let scale = 2.38 / (free.len() as f64).sqrt();
    let steps: Vec<f64> = free
        .iter()
        .map(|&s| {
            let e = fit.errors[s];
            if e.is_finite() && e > 0.0 {
                e * scale
            } else {
                (fit.values[s].abs() * 1e-3).max(1e-6)
            }
        })
        .collect();

    let mut current = fit.values.clone();
    let mut log_l = log_likelihood(dataset, model, params, &current)?;
    let mut accepted = 0usize;
    let kept = config.mcmc_steps - config.mcmc_burn;
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(kept); free.len()];

    for step in 0..config.mcmc_steps {
        let mut proposal = current.clone();
        for (k, &slot) in free.iter().enumerate() {
            let z: f64 = rng.sample(StandardNormal);
            proposal[slot] += steps[k] * z;
        }
        let log_l_new = log_likelihood(dataset, model, params, &proposal)?;
        let u: f64 = rng.gen_range(0.0..1.0);
        if u.ln() < log_l_new - log_l {
            current = proposal;
            log_l = log_l_new;
            accepted += 1;
        }
        if step >= config.mcmc_burn {
            for (k, &slot) in free.iter().enumerate() {
                samples[k].push(current[slot]);
            }
        }
    }

    let labels = params.labels();
    let mut posteriors = Vec::with_capacity(free.len());
    for (label, mut draws) in labels.into_iter().zip(samples) {
        let median = median_mut(&mut draws).unwrap_or(f64::NAN);
        // `median_mut` leaves the draws sorted.
        posteriors.push(ParamPosterior {
            label,
            median,
            lower: percentile_sorted(&draws, 16.0).unwrap_or(f64::NAN),
            upper: percentile_sorted(&draws, 84.0).unwrap_or(f64::NAN),
        });
    }

    Ok(ChainSummary {
        source: source.to_string(),
        steps: config.mcmc_steps,
        burn: config.mcmc_burn,
        acceptance: accepted as f64 / config.mcmc_steps as f64,
        params: posteriors,
    })
}

fn log_likelihood(
    dataset: &Dataset,
    model: &Model,
    params: &ParameterVector,
    values: &[f64],
) -> Result<f64, AppError> {
    let fitted = model.predict(dataset, params, values)?;
    let chi2: f64 = dataset
        .y()
        .iter()
        .zip(&fitted)
        .zip(dataset.err())
        .map(|((y, f), e)| ((y - f) / e).powi(2))
        .sum();
    Ok(-0.5 * chi2)
}

fn chain_seed(seed: u64, source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    source.hash(&mut hasher);
    hasher.finish()
}

fn source_stem(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

fn write_summary(path: &Path, summary: &ChainSummary) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::Sampler(format!(
            "Failed to create MCMC summary '{}': {e}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::Sampler(format!("Failed to write MCMC summary: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParamRow, ParameterTable};
    use crate::fit::{Fitter, LinearLeastSquares};
    use crate::models::ModelFunction;

    fn setup() -> (Dataset, ParameterVector, Model, FitResult, RunConfig) {
        let n = 40;
        let t: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = t
            .iter()
            .enumerate()
            .map(|(i, t)| 2.0 + 0.3 * t + if i % 3 == 0 { 0.05 } else { -0.025 })
            .collect();
        let d = Dataset::new("chan7.txt", t, y, vec![0.05; n], vec![0; n]).unwrap();
        let table = ParameterTable::from_rows(vec![
            ParamRow {
                name: "c".into(),
                value: 0.0,
                fixed: false,
                tied: true,
            },
            ParamRow {
                name: "v".into(),
                value: 0.0,
                fixed: false,
                tied: true,
            },
        ])
        .unwrap();
        let params = ParameterVector::build(&table, 1).unwrap();
        let functions = [ModelFunction::Constant, ModelFunction::Polynomial];
        let model = Model::build(&d, &functions, &params).unwrap();
        let config = RunConfig {
            mcmc_steps: 3_000,
            mcmc_burn: 500,
            ..RunConfig::default()
        };
        let fit = LinearLeastSquares.fit(&params, &d, &config, &model, false).unwrap();
        (d, params, model, fit, config)
    }

    #[test]
    fn chain_centres_on_least_squares_solution() {
        let (d, params, model, fit, config) = setup();
        let summary = run_chain(&d, &model, &fit, &params, &config, "chan7.txt").unwrap();

        assert!(summary.acceptance > 0.05 && summary.acceptance < 0.95);
        for (k, post) in summary.params.iter().enumerate() {
            let slot = params.free_indices()[k];
            assert!(post.lower <= post.median && post.median <= post.upper);
            assert!((post.median - fit.values[slot]).abs() < 3.0 * fit.errors[slot]);
        }
    }

    #[test]
    fn same_seed_same_chain() {
        let (d, params, model, fit, config) = setup();
        let a = run_chain(&d, &model, &fit, &params, &config, "chan7.txt").unwrap();
        let b = run_chain(&d, &model, &fit, &params, &config, "chan7.txt").unwrap();
        assert_eq!(a.acceptance, b.acceptance);
        assert_eq!(a.params[0].median, b.params[0].median);
    }

    #[test]
    fn sampler_writes_summary_file() {
        let (d, params, model, fit, config) = setup();
        let dir = tempfile::tempdir().unwrap();
        let sampler = MetropolisSampler::new(Some(dir.path().to_path_buf()));
        sampler
            .run(&d, &model, &fit, "data/chan7.txt", &config, &params)
            .unwrap();
        assert!(dir.path().join("mcmc_chan7.json").exists());
    }
}
