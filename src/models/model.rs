//! Linear-in-parameters model built from named basis functions.
//!
//! Each parameter name maps to one basis term evaluated per row:
//!
//! | function     | parameters             | term                                  |
//! |--------------|------------------------|---------------------------------------|
//! | `constant`   | `c`                    | `1`                                   |
//! | `polynomial` | `v`, `v2`              | `dt`, `dt^2` with `dt = t - t0(visit)` |
//! | `sinusoid`   | `amp_sin`, `amp_cos`   | `sin(2πt/P)`, `cos(2πt/P)`            |
//!
//! `period` (`P`) is a shape parameter of the sinusoid and must be fixed, so the
//! model stays linear in the fitted parameters.
//!
//! The fitter relies on two primitive operations:
//! - build a design matrix over the free slots (plus the fixed-slot offset)
//! - predict `y` for a full parameter vector

use std::f64::consts::TAU;

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, ParameterVector};
use crate::error::AppError;

/// Shape parameter of the sinusoid.
pub const PERIOD: &str = "period";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelFunction {
    Constant,
    Polynomial,
    Sinusoid,
}

impl ModelFunction {
    /// Parameter names owned by this function.
    pub fn parameters(self) -> &'static [&'static str] {
        match self {
            ModelFunction::Constant => &["c"],
            ModelFunction::Polynomial => &["v", "v2"],
            ModelFunction::Sinusoid => &["amp_sin", "amp_cos", PERIOD],
        }
    }

    fn owns(self, name: &str) -> bool {
        self.parameters().contains(&name)
    }
}

/// Validated model for one dataset and parameter vector.
#[derive(Debug, Clone)]
pub struct Model {
    functions: Vec<ModelFunction>,
}

impl Model {
    pub fn build(
        dataset: &Dataset,
        functions: &[ModelFunction],
        params: &ParameterVector,
    ) -> Result<Self, AppError> {
        if functions.is_empty() {
            return Err(AppError::input("Model function set is empty."));
        }
        for slot in params.slots() {
            if !functions.iter().any(|f| f.owns(&slot.name)) {
                return Err(AppError::input(format!(
                    "Parameter '{}' is not used by any enabled model function.",
                    slot.name
                )));
            }
            if slot.name == PERIOD && !slot.fixed {
                return Err(AppError::input("Parameter 'period' must be fixed."));
            }
        }
        if functions.contains(&ModelFunction::Sinusoid) {
            for slot in params.slots().iter().filter(|s| s.name == PERIOD) {
                if slot.value <= 0.0 {
                    return Err(AppError::input("Parameter 'period' must be > 0."));
                }
            }
        }
        if let Some(v) = dataset.visit().iter().find(|v| **v >= params.nvisit()) {
            return Err(AppError::input(format!(
                "Dataset '{}' contains visit {v} but the run has {} visit(s).",
                dataset.source(),
                params.nvisit()
            )));
        }
        Ok(Self {
            functions: functions.to_vec(),
        })
    }

    pub fn functions(&self) -> &[ModelFunction] {
        &self.functions
    }

    /// Design matrix over the free slots (unweighted, `n × n_free`) and the
    /// contribution of the fixed slots to each row.
    pub fn design(
        &self,
        dataset: &Dataset,
        params: &ParameterVector,
    ) -> Result<(DMatrix<f64>, DVector<f64>), AppError> {
        let free = params.free_indices();
        let n = dataset.len();
        let mut x = DMatrix::<f64>::zeros(n, free.len());
        let mut offset = DVector::<f64>::zeros(n);
        let values = params.initial_values();

        for i in 0..n {
            let visit = dataset.visit()[i];
            let period = period_for(params, &values, visit);
            for (s, slot) in params.slots().iter().enumerate() {
                if !slot.applies_to(visit) {
                    continue;
                }
                let term = basis(&slot.name, dataset, i, period)?;
                if slot.fixed {
                    offset[i] += slot.value * term;
                } else if let Some(col) = free.iter().position(|&f| f == s) {
                    x[(i, col)] = term;
                }
            }
        }
        Ok((x, offset))
    }

    /// Model value at every row for a full parameter vector.
    pub fn predict(
        &self,
        dataset: &Dataset,
        params: &ParameterVector,
        values: &[f64],
    ) -> Result<Vec<f64>, AppError> {
        if values.len() != params.len() {
            return Err(AppError::input(format!(
                "Expected {} parameter values, got {}.",
                params.len(),
                values.len()
            )));
        }
        let mut out = Vec::with_capacity(dataset.len());
        for i in 0..dataset.len() {
            let visit = dataset.visit()[i];
            let period = period_for(params, values, visit);
            let mut y = 0.0;
            for (s, slot) in params.slots().iter().enumerate() {
                if slot.applies_to(visit) {
                    y += values[s] * basis(&slot.name, dataset, i, period)?;
                }
            }
            out.push(y);
        }
        Ok(out)
    }
}

fn period_for(params: &ParameterVector, values: &[f64], visit: usize) -> Option<f64> {
    params.slot_for(PERIOD, visit).map(|s| values[s])
}

fn basis(name: &str, dataset: &Dataset, row: usize, period: Option<f64>) -> Result<f64, AppError> {
    let t = dataset.t()[row];
    let dt = t - dataset.visit_start(dataset.visit()[row]);
    let phase = || {
        period
            .map(|p| TAU * t / p)
            .ok_or_else(|| AppError::input("Sinusoid terms need a 'period' parameter."))
    };
    match name {
        "c" => Ok(1.0),
        "v" => Ok(dt),
        "v2" => Ok(dt * dt),
        "amp_sin" => Ok(phase()?.sin()),
        "amp_cos" => Ok(phase()?.cos()),
        // Shape parameter: contributes through the sinusoid terms only.
        PERIOD => Ok(0.0),
        other => Err(AppError::input(format!("Unknown parameter '{other}'."))),
    }
}
