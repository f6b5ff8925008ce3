//! Batch runner: the clip controller over an ordered list of sources.
//!
//! Results are stored by input position. A failing dataset occupies its own
//! slot as an `Err`, so it can never shift another dataset's results.
//! With `RunConfig::parallel` the sources are fitted on the rayon pool; the
//! indexed `par_iter` collect keeps input order regardless of completion order.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{CumulativeClip, TerminationKind};
use crate::error::AppError;
use crate::fit::controller::{ClipController, DatasetFit};
use crate::fit::extract::{ParamSummary, extract_params};

/// Successful outcome for one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub summary: ParamSummary,
    pub termination: TerminationKind,
    pub clipped: CumulativeClip,
    pub fit_calls: usize,
    pub rms: f64,
    pub chi2red: f64,
    pub n_points: usize,
}

impl DatasetOutcome {
    fn from_fit(fit: &DatasetFit, summary: ParamSummary) -> Self {
        let last = fit.final_fit();
        Self {
            summary,
            termination: fit.termination.kind(),
            clipped: fit.clipped.clone(),
            fit_calls: fit.fit_calls,
            rms: last.rms,
            chi2red: last.chi2red,
            n_points: last.n_points,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub position: usize,
    pub source: String,
    pub outcome: Result<DatasetOutcome, AppError>,
}

/// Per-position results of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    pub entries: Vec<BatchEntry>,
}

impl BatchResults {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point estimates by dataset position (`None` for failed datasets).
    pub fn values(&self) -> Vec<Option<&[f64]>> {
        self.entries
            .iter()
            .map(|e| e.outcome.as_ref().ok().map(|o| o.summary.values.as_slice()))
            .collect()
    }

    pub fn errors(&self) -> Vec<Option<&[f64]>> {
        self.entries
            .iter()
            .map(|e| e.outcome.as_ref().ok().map(|o| o.summary.errors.as_slice()))
            .collect()
    }

    pub fn indices(&self) -> Vec<Option<&[usize]>> {
        self.entries
            .iter()
            .map(|e| e.outcome.as_ref().ok().map(|o| o.summary.indices.as_slice()))
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&BatchEntry, &AppError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (e, err)))
    }
}

pub struct BatchRunner<'a> {
    controller: ClipController<'a>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(controller: ClipController<'a>) -> Self {
        Self { controller }
    }

    pub fn run(&self, sources: &[String]) -> BatchResults {
        let total = sources.len();
        let entries: Vec<BatchEntry> = if self.controller.config().parallel {
            sources
                .par_iter()
                .enumerate()
                .map(|(position, source)| self.run_one(position, total, source))
                .collect()
        } else {
            sources
                .iter()
                .enumerate()
                .map(|(position, source)| self.run_one(position, total, source))
                .collect()
        };

        let results = BatchResults { entries };
        info!(
            datasets = total,
            succeeded = results.succeeded(),
            "batch finished"
        );
        results
    }

    fn run_one(&self, position: usize, total: usize, source: &str) -> BatchEntry {
        info!(source, "fitting dataset {}/{}", position + 1, total);
        let outcome = self.controller.run(source).map(|fit| {
            let summary = extract_params(fit.final_fit(), self.controller.params());
            DatasetOutcome::from_fit(&fit, summary)
        });

        match &outcome {
            Ok(o) => info!(
                source,
                termination = o.termination.display_name(),
                clipped = o.clipped.len(),
                chi2red = o.chi2red,
                "dataset done"
            ),
            Err(err) => warn!(source, %err, "dataset failed"),
        }

        BatchEntry {
            position,
            source: source.to_string(),
            outcome,
        }
    }
}
