//! Fit collaborator: one weighted least-squares fit of a dataset.
//!
//! Given:
//! - a dataset `(t_i, y_i, σ_i, visit_i)`
//! - a parameter vector (fixed and free slots)
//! - a linear model built from the enabled functions
//!
//! we solve for the free slots, derive their uncertainties from the
//! covariance, compute residual statistics and, when asked, flag rows whose
//! normalised residual exceeds the configured clip threshold.

use nalgebra::DVector;

use crate::domain::{Dataset, FitResult, LocalIndex, ParameterVector, RunConfig};
use crate::error::AppError;
use crate::math::{covariance, solve_least_squares};
use crate::models::Model;

/// Anything that can fit a dataset and report outliers in its local frame.
pub trait Fitter: Send + Sync {
    fn fit(
        &self,
        params: &ParameterVector,
        dataset: &Dataset,
        config: &RunConfig,
        model: &Model,
        detect_outliers: bool,
    ) -> Result<FitResult, AppError>;
}

/// Linear weighted least squares over the model's design matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearLeastSquares;

impl Fitter for LinearLeastSquares {
    fn fit(
        &self,
        params: &ParameterVector,
        dataset: &Dataset,
        config: &RunConfig,
        model: &Model,
        detect_outliers: bool,
    ) -> Result<FitResult, AppError> {
        let free = params.free_indices();
        let n = dataset.len();
        let p = free.len();
        if n <= p {
            return Err(AppError::divergence(format!(
                "'{}': {n} points cannot constrain {p} free parameters.",
                dataset.source()
            )));
        }

        let mut values = params.initial_values();
        let mut errors = vec![0.0; params.len()];

        if p > 0 {
            let (x, offset) = model.design(dataset, params)?;

            // Scale rows by 1/σ so the problem becomes ordinary least squares.
            let mut xw = x;
            let mut yw = DVector::<f64>::zeros(n);
            for i in 0..n {
                let inv = 1.0 / dataset.err()[i];
                for j in 0..p {
                    xw[(i, j)] *= inv;
                }
                yw[i] = (dataset.y()[i] - offset[i]) * inv;
            }

            let beta = solve_least_squares(&xw, &yw).ok_or_else(|| {
                AppError::divergence(format!(
                    "'{}': least-squares system is too ill-conditioned.",
                    dataset.source()
                ))
            })?;
            let cov = covariance(&xw).ok_or_else(|| {
                AppError::divergence(format!(
                    "'{}': singular normal matrix (degenerate parameters?).",
                    dataset.source()
                ))
            })?;

            for (col, &slot) in free.iter().enumerate() {
                values[slot] = beta[col];
                errors[slot] = cov[(col, col)].max(0.0).sqrt();
            }
        }

        let fitted = model.predict(dataset, params, &values)?;
        let residuals: Vec<f64> = dataset
            .y()
            .iter()
            .zip(&fitted)
            .map(|(y, f)| y - f)
            .collect();

        let dof = n - p;
        let chi2: f64 = residuals
            .iter()
            .zip(dataset.err())
            .map(|(r, e)| (r / e).powi(2))
            .sum();
        let chi2red = chi2 / dof as f64;
        let rms = normalized_rms(&residuals, dataset.y());

        if !(chi2red.is_finite() && rms.is_finite()) {
            return Err(AppError::divergence(format!(
                "'{}': non-finite residual statistics.",
                dataset.source()
            )));
        }

        let outliers = detect_outliers.then(|| {
            residuals
                .iter()
                .zip(dataset.err())
                .enumerate()
                .filter(|(_, (r, e))| (*r / *e).abs() > config.clip_sigma)
                .map(|(i, _)| LocalIndex::new(i))
                .collect()
        });

        Ok(FitResult {
            values,
            errors,
            rms,
            chi2red,
            dof,
            n_points: n,
            outliers,
        })
    }
}

/// RMS of the residuals divided by the mean level of `y` (plain RMS if that
/// level is zero).
fn normalized_rms(residuals: &[f64], y: &[f64]) -> f64 {
    let n = residuals.len() as f64;
    let rms = (residuals.iter().map(|r| r * r).sum::<f64>() / n).sqrt();
    let level = (y.iter().sum::<f64>() / y.len() as f64).abs();
    if level > 0.0 { rms / level } else { rms }
}
