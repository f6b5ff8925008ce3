//! Post-fit Bayesian samplers.
//!
//! The clip controller only prepares inputs (rescaled uncertainties plus a
//! fresh least-squares solution); samplers own their outputs.

use crate::domain::{Dataset, FitResult, ParameterVector, RunConfig, SamplerKind};
use crate::error::AppError;
use crate::models::Model;

pub mod mcmc;

pub use mcmc::*;

pub trait Sampler: Send + Sync {
    fn kind(&self) -> SamplerKind;

    fn run(
        &self,
        dataset: &Dataset,
        model: &Model,
        fit: &FitResult,
        source: &str,
        config: &RunConfig,
        params: &ParameterVector,
    ) -> Result<(), AppError>;
}
