//! Shared domain types.
//!
//! Two index coordinate systems are in play while a dataset is being clipped:
//!
//! - the **original** frame: row positions in the unclipped (iteration-0) dataset
//! - the **local** frame: row positions in whatever dataset the current clip
//!   iteration is looking at
//!
//! They are kept apart as [`OriginalIndex`] and [`LocalIndex`]. The only code
//! that turns a local index into an original one is
//! [`crate::fit::clip::translate_clips`].

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, IndexFrame};
use crate::models::ModelFunction;

/// Row position in the dataset of the current clip iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalIndex(usize);

impl LocalIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Row position in the unclipped dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OriginalIndex(usize);

impl OriginalIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for LocalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OriginalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outlier sets detected on each clip iteration, each in that iteration's
/// local frame (not merged).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClipRecord {
    iterations: Vec<Vec<LocalIndex>>,
}

impl ClipRecord {
    pub fn push(&mut self, local: Vec<LocalIndex>) {
        self.iterations.push(local);
    }

    pub fn iterations(&self) -> &[Vec<LocalIndex>] {
        &self.iterations
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }
}

/// Merged, sorted, unique set of original-frame rows excluded so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CumulativeClip {
    indices: Vec<OriginalIndex>,
}

impl CumulativeClip {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from arbitrary original-frame indices (sorted and deduplicated here).
    pub fn from_original(mut indices: Vec<OriginalIndex>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn indices(&self) -> &[OriginalIndex] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, index: OriginalIndex) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Raw positions, mostly for reports.
    pub fn to_positions(&self) -> Vec<usize> {
        self.indices.iter().map(|i| i.get()).collect()
    }

    /// Fail if any index does not fit an original dataset of `n_original` rows.
    pub fn check_bounds(&self, n_original: usize) -> Result<(), AppError> {
        match self.indices.last() {
            Some(last) if last.get() >= n_original => Err(AppError::IndexOutOfBounds {
                frame: IndexFrame::Original,
                index: last.get(),
                len: n_original,
            }),
            _ => Ok(()),
        }
    }
}

/// One source's observations: independent variable, dependent variable,
/// uncertainties and visit (epoch) labels.
///
/// Datasets are never mutated. Clipping and error rescaling produce new values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    source: String,
    t: Vec<f64>,
    y: Vec<f64>,
    err: Vec<f64>,
    visit: Vec<usize>,
    /// Original-frame position of each row.
    rows: Vec<OriginalIndex>,
    n_original: usize,
    /// Earliest `t` of each visit in the unclipped data.
    visit_t0: BTreeMap<usize, f64>,
}

impl Dataset {
    /// Build an unclipped dataset. Every row is its own original index.
    pub fn new(
        source: impl Into<String>,
        t: Vec<f64>,
        y: Vec<f64>,
        err: Vec<f64>,
        visit: Vec<usize>,
    ) -> Result<Self, AppError> {
        let source = source.into();
        let n = t.len();
        if y.len() != n || err.len() != n || visit.len() != n {
            return Err(AppError::input(format!(
                "Dataset '{source}' has mismatched column lengths: t={}, y={}, err={}, visit={}.",
                n,
                y.len(),
                err.len(),
                visit.len()
            )));
        }
        if n == 0 {
            return Err(AppError::input(format!("Dataset '{source}' is empty.")));
        }
        if let Some(i) = t.iter().zip(&y).position(|(a, b)| !a.is_finite() || !b.is_finite()) {
            return Err(AppError::input(format!(
                "Dataset '{source}' has a non-finite value in row {i}."
            )));
        }
        if let Some(i) = err.iter().position(|e| !e.is_finite() || *e <= 0.0) {
            return Err(AppError::input(format!(
                "Dataset '{source}' has a non-positive uncertainty in row {i}."
            )));
        }

        // Keyed by visit: indices come straight from input files and are only
        // checked against the run's visit count by the loader.
        let mut visit_t0 = BTreeMap::new();
        for (&ti, &v) in t.iter().zip(&visit) {
            visit_t0
                .entry(v)
                .and_modify(|t0: &mut f64| *t0 = t0.min(ti))
                .or_insert(ti);
        }

        Ok(Self {
            source,
            t,
            y,
            err,
            visit,
            rows: (0..n).map(OriginalIndex::new).collect(),
            n_original: n,
            visit_t0,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn t(&self) -> &[f64] {
        &self.t
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn err(&self) -> &[f64] {
        &self.err
    }

    pub fn visit(&self) -> &[usize] {
        &self.visit
    }

    pub fn original_rows(&self) -> &[OriginalIndex] {
        &self.rows
    }

    /// Row count of the unclipped dataset this one derives from.
    pub fn n_original(&self) -> usize {
        self.n_original
    }

    /// One past the highest visit index present.
    pub fn n_visits(&self) -> usize {
        self.visit_t0.keys().next_back().map_or(0, |v| v.saturating_add(1))
    }

    /// Start time of `visit` (0.0 for visits with no rows).
    pub fn visit_start(&self, visit: usize) -> f64 {
        self.visit_t0.get(&visit).copied().unwrap_or(0.0)
    }

    /// New dataset with every row whose original index is in `clip` removed.
    pub fn excluding(&self, clip: &CumulativeClip) -> Result<Dataset, AppError> {
        clip.check_bounds(self.n_original)?;

        let keep: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !clip.contains(**row))
            .map(|(i, _)| i)
            .collect();

        if keep.is_empty() {
            return Err(AppError::input(format!(
                "Clipping removed every row of dataset '{}'.",
                self.source
            )));
        }

        Ok(Dataset {
            source: self.source.clone(),
            t: keep.iter().map(|&i| self.t[i]).collect(),
            y: keep.iter().map(|&i| self.y[i]).collect(),
            err: keep.iter().map(|&i| self.err[i]).collect(),
            visit: keep.iter().map(|&i| self.visit[i]).collect(),
            rows: keep.iter().map(|&i| self.rows[i]).collect(),
            n_original: self.n_original,
            visit_t0: self.visit_t0.clone(),
        })
    }

    /// New dataset with every uncertainty multiplied by `factor`.
    pub fn with_scaled_errors(&self, factor: f64) -> Result<Dataset, AppError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(AppError::input(format!(
                "Cannot rescale uncertainties of '{}' by {factor}.",
                self.source
            )));
        }
        Ok(Dataset {
            err: self.err.iter().map(|e| e * factor).collect(),
            ..self.clone()
        })
    }
}

/// Outcome of one fit attempt against a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Point estimates for every parameter slot (fixed slots keep their value).
    pub values: Vec<f64>,
    /// One-sigma uncertainties (0 for fixed slots).
    pub errors: Vec<f64>,
    /// RMS of the residuals relative to the mean level of `y`.
    pub rms: f64,
    pub chi2red: f64,
    pub dof: usize,
    pub n_points: usize,
    /// Flagged rows in the fitted dataset's local frame; `None` when
    /// detection was disabled for this fit.
    pub outliers: Option<Vec<LocalIndex>>,
}

impl FitResult {
    pub fn local_outliers(&self) -> &[LocalIndex] {
        self.outliers.as_deref().unwrap_or(&[])
    }
}

/// How the clip loop ended. Each variant carries the final fit.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipTermination {
    /// Clipping disabled (`max_clip_iters = 0`): a single no-clip fit.
    Unclipped(FitResult),
    /// A detecting fit found no outliers before the budget ran out.
    Converged(FitResult),
    /// The budget ran out; the final fit is the forced no-clip refit.
    BudgetExhausted(FitResult),
}

impl ClipTermination {
    pub fn fit(&self) -> &FitResult {
        match self {
            ClipTermination::Unclipped(fit)
            | ClipTermination::Converged(fit)
            | ClipTermination::BudgetExhausted(fit) => fit,
        }
    }

    pub fn kind(&self) -> TerminationKind {
        match self {
            ClipTermination::Unclipped(_) => TerminationKind::Unclipped,
            ClipTermination::Converged(_) => TerminationKind::Converged,
            ClipTermination::BudgetExhausted(_) => TerminationKind::BudgetExhausted,
        }
    }
}

/// Payload-free form of [`ClipTermination`] for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    Unclipped,
    Converged,
    BudgetExhausted,
}

impl TerminationKind {
    pub fn display_name(self) -> &'static str {
        match self {
            TerminationKind::Unclipped => "unclipped",
            TerminationKind::Converged => "converged",
            TerminationKind::BudgetExhausted => "budget",
        }
    }
}

/// Post-fit sampler flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    Mcmc,
    Nested,
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerKind::Mcmc => write!(f, "MCMC"),
            SamplerKind::Nested => write!(f, "nested"),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// Built once (from CLI flags plus defaults) and only ever borrowed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub label: String,
    /// Number of visits (epochs) in every dataset.
    pub nvisit: usize,
    /// Maximum number of outlier-detecting fits per dataset (0 disables clipping).
    pub max_clip_iters: usize,
    /// Rows with `|residual / err|` above this are flagged as outliers.
    pub clip_sigma: f64,
    /// Model function set.
    pub functions: Vec<ModelFunction>,
    pub run_mcmc: bool,
    pub run_nested: bool,
    pub mcmc_steps: usize,
    pub mcmc_burn: usize,
    pub seed: u64,
    /// Fit datasets on the rayon pool instead of one after another.
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            label: "run".to_string(),
            nvisit: 1,
            max_clip_iters: 2,
            clip_sigma: 3.0,
            functions: vec![ModelFunction::Constant, ModelFunction::Polynomial],
            run_mcmc: false,
            run_nested: false,
            mcmc_steps: 5_000,
            mcmc_burn: 1_000,
            seed: 42,
            parallel: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.nvisit == 0 {
            return Err(AppError::input("nvisit must be >= 1."));
        }
        if !(self.clip_sigma.is_finite() && self.clip_sigma > 0.0) {
            return Err(AppError::input(format!(
                "clip_sigma must be finite and > 0 (got {}).",
                self.clip_sigma
            )));
        }
        if self.functions.is_empty() {
            return Err(AppError::input("At least one model function is required."));
        }
        if self.run_mcmc && self.mcmc_steps <= self.mcmc_burn {
            return Err(AppError::input(format!(
                "mcmc_steps ({}) must exceed mcmc_burn ({}).",
                self.mcmc_steps, self.mcmc_burn
            )));
        }
        Ok(())
    }

    /// Requested samplers, in the order they run.
    pub fn requested_samplers(&self) -> Vec<SamplerKind> {
        let mut out = Vec::new();
        if self.run_mcmc {
            out.push(SamplerKind::Mcmc);
        }
        if self.run_nested {
            out.push(SamplerKind::Nested);
        }
        out
    }
}
