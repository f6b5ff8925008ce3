//! Fixed-shape per-dataset summary handed to reporting.

use serde::Serialize;

use crate::domain::{FitResult, ParameterVector};

/// Point estimates and uncertainties for every slot, plus the slot positions
/// that reporting should show (one per label, in label order).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
    pub indices: Vec<usize>,
}

pub fn extract_params(fit: &FitResult, params: &ParameterVector) -> ParamSummary {
    ParamSummary {
        values: fit.values.clone(),
        errors: fit.errors.clone(),
        indices: params.free_indices(),
    }
}

impl ParamSummary {
    /// `(value, error)` of the `k`-th reported parameter.
    pub fn reported(&self, k: usize) -> Option<(f64, f64)> {
        let slot = *self.indices.get(k)?;
        Some((self.values[slot], self.errors[slot]))
    }
}
