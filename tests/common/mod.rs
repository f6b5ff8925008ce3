#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use clipfit::domain::{
    Dataset, FitResult, LocalIndex, ParamRow, ParameterTable, ParameterVector, RunConfig,
    SamplerKind,
};
use clipfit::error::AppError;
use clipfit::fit::{Fitter, LinearLeastSquares};
use clipfit::models::{Model, ModelFunction};
use clipfit::sample::Sampler;

/// Constant-only run with `max_clip_iters = m`.
pub fn constant_config(m: usize) -> RunConfig {
    RunConfig {
        label: "test".into(),
        max_clip_iters: m,
        functions: vec![ModelFunction::Constant],
        ..RunConfig::default()
    }
}

pub fn constant_params() -> ParameterVector {
    let table = ParameterTable::from_rows(vec![ParamRow {
        name: "c".into(),
        value: 1.0,
        fixed: false,
        tied: true,
    }])
    .unwrap();
    ParameterVector::build(&table, 1).unwrap()
}

/// `n` rows alternating `level ± 0.05`, with optional spikes at `spikes`.
pub fn flat_dataset(source: &str, n: usize, err: f64, spikes: &[usize]) -> Dataset {
    let t: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let y: Vec<f64> = (0..n)
        .map(|i| {
            if spikes.contains(&i) {
                10.0
            } else if i % 2 == 0 {
                5.05
            } else {
                4.95
            }
        })
        .collect();
    Dataset::new(source, t, y, vec![err; n], vec![0; n]).unwrap()
}

/// Flags local row 0 on every detecting fit, so clipping never converges.
pub struct AlwaysFlagFirst;

impl Fitter for AlwaysFlagFirst {
    fn fit(
        &self,
        params: &ParameterVector,
        dataset: &Dataset,
        _config: &RunConfig,
        _model: &Model,
        detect_outliers: bool,
    ) -> Result<FitResult, AppError> {
        Ok(FitResult {
            values: params.initial_values(),
            errors: vec![0.0; params.len()],
            rms: 0.0,
            chi2red: 1.0,
            dof: dataset.len().saturating_sub(params.n_free()),
            n_points: dataset.len(),
            outliers: detect_outliers.then(|| vec![LocalIndex::new(0)]),
        })
    }
}

/// Records the reduced chi-square and uncertainty of every fit it is handed.
#[derive(Default)]
pub struct RecordingSampler {
    pub seen: Mutex<Vec<(f64, f64)>>,
}

impl Sampler for RecordingSampler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Mcmc
    }

    fn run(
        &self,
        dataset: &Dataset,
        _model: &Model,
        fit: &FitResult,
        _source: &str,
        _config: &RunConfig,
        _params: &ParameterVector,
    ) -> Result<(), AppError> {
        self.seen.lock().unwrap().push((fit.chi2red, dataset.err()[0]));
        Ok(())
    }
}

/// Least squares everywhere, except that the `nth` detecting fit (1-based) of
/// `source` diverges.
pub struct DivergeOn {
    pub source: String,
    pub nth: usize,
    detecting: Mutex<HashMap<String, usize>>,
}

impl DivergeOn {
    pub fn new(source: &str, nth: usize) -> Self {
        Self {
            source: source.to_string(),
            nth,
            detecting: Mutex::new(HashMap::new()),
        }
    }
}

impl Fitter for DivergeOn {
    fn fit(
        &self,
        params: &ParameterVector,
        dataset: &Dataset,
        config: &RunConfig,
        model: &Model,
        detect_outliers: bool,
    ) -> Result<FitResult, AppError> {
        if detect_outliers {
            let mut counts = self.detecting.lock().unwrap();
            let count = counts.entry(dataset.source().to_string()).or_insert(0);
            *count += 1;
            if dataset.source() == self.source && *count == self.nth {
                return Err(AppError::divergence(format!("'{}' diverged", self.source)));
            }
        }
        LinearLeastSquares.fit(params, dataset, config, model, detect_outliers)
    }
}
