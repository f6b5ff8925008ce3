//! Per-dataset clip-and-refit loop.
//!
//! For `max_clip_iters = M > 0` the loop performs at most `M` outlier-detecting
//! fits followed by one forced no-clip fit:
//!
//! ```text
//! i = 0..M-1 : fit(detect) ── no outliers ──▶ Converged(fit)
//!                  │
//!                  └─ outliers ─▶ translate into original frame, reload
//!                                 dataset without them, next i
//! i = M      : fit(no detect) ─▶ BudgetExhausted(fit)
//! ```
//!
//! With `M = 0` there is a single no-clip fit (`Unclipped`).
//!
//! A failing fit propagates unchanged. The loop never retries a fit; the only
//! "retry" is clipping and refitting, bounded by `M`.

use tracing::{debug, warn};

use crate::domain::{
    ClipRecord, ClipTermination, CumulativeClip, Dataset, FitResult, ParameterVector, RunConfig,
    SamplerKind,
};
use crate::error::AppError;
use crate::fit::clip::translate_clips;
use crate::fit::fitter::Fitter;
use crate::io::DatasetLoader;
use crate::models::Model;
use crate::sample::Sampler;

/// One sampler invocation and the rescaled refit it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRun {
    pub kind: SamplerKind,
    /// Factor applied to the uncertainties (`sqrt(chi2red)` of the previous fit).
    pub scale: f64,
    pub fit: FitResult,
}

/// Everything the controller learned about one dataset.
#[derive(Debug, Clone)]
pub struct DatasetFit {
    pub source: String,
    pub termination: ClipTermination,
    /// Dataset the final fit was computed on (clipped, rescaled if sampled).
    pub dataset: Dataset,
    pub clip_record: ClipRecord,
    pub clipped: CumulativeClip,
    /// Fit collaborator invocations, including sampling refits.
    pub fit_calls: usize,
    pub sampling: Vec<SamplingRun>,
}

impl DatasetFit {
    /// Fit used for reporting: the last sampling refit if any ran, otherwise
    /// the clip loop's final fit.
    pub fn final_fit(&self) -> &FitResult {
        self.sampling
            .last()
            .map(|s| &s.fit)
            .unwrap_or_else(|| self.termination.fit())
    }
}

/// Drives the clip loop for one source at a time. Holds only borrowed,
/// read-only collaborators, so one controller can serve many datasets (and
/// threads).
pub struct ClipController<'a> {
    config: &'a RunConfig,
    params: &'a ParameterVector,
    loader: &'a dyn DatasetLoader,
    fitter: &'a dyn Fitter,
    samplers: Vec<&'a dyn Sampler>,
}

impl<'a> ClipController<'a> {
    pub fn new(
        config: &'a RunConfig,
        params: &'a ParameterVector,
        loader: &'a dyn DatasetLoader,
        fitter: &'a dyn Fitter,
    ) -> Result<Self, AppError> {
        config.validate()?;
        if params.nvisit() != config.nvisit {
            return Err(AppError::input(format!(
                "Parameter vector was built for {} visit(s) but the run has {}.",
                params.nvisit(),
                config.nvisit
            )));
        }
        Ok(Self {
            config,
            params,
            loader,
            fitter,
            samplers: Vec::new(),
        })
    }

    pub fn with_sampler(mut self, sampler: &'a dyn Sampler) -> Self {
        self.samplers.push(sampler);
        self
    }

    pub fn config(&self) -> &RunConfig {
        self.config
    }

    pub fn params(&self) -> &ParameterVector {
        self.params
    }

    /// Run the clip loop (and any requested sampling) for `source`.
    pub fn run(&self, source: &str) -> Result<DatasetFit, AppError> {
        // Resolve samplers up front so a missing one fails before any fitting.
        let samplers = self
            .config
            .requested_samplers()
            .into_iter()
            .map(|kind| {
                self.samplers
                    .iter()
                    .copied()
                    .find(|s| s.kind() == kind)
                    .ok_or_else(|| {
                        AppError::input(format!(
                            "{kind} sampling requested but no {kind} sampler is configured."
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = ClipState::default();
        let (termination, mut dataset) = self.clip_loop(source, &mut state)?;

        let mut sampling: Vec<SamplingRun> = Vec::with_capacity(samplers.len());
        for sampler in samplers {
            let previous = sampling
                .last()
                .map(|s| &s.fit)
                .unwrap_or_else(|| termination.fit());
            let mut scale = previous.chi2red.sqrt();
            if !(scale.is_finite() && scale > 0.0) {
                // A perfect fit leaves nothing to rescale by.
                warn!(
                    source,
                    chi2red = previous.chi2red,
                    "uncertainties left unscaled for sampling"
                );
                scale = 1.0;
            }
            let rescaled = dataset.with_scaled_errors(scale)?;
            let model = Model::build(&rescaled, &self.config.functions, self.params)?;
            let refit = self
                .fitter
                .fit(self.params, &rescaled, self.config, &model, false)?;
            state.fit_calls += 1;
            debug!(
                source,
                sampler = %sampler.kind(),
                scale,
                chi2red = refit.chi2red,
                "uncertainties rescaled for sampling"
            );
            sampler.run(&rescaled, &model, &refit, source, self.config, self.params)?;
            sampling.push(SamplingRun {
                kind: sampler.kind(),
                scale,
                fit: refit,
            });
            dataset = rescaled;
        }

        Ok(DatasetFit {
            source: source.to_string(),
            termination,
            dataset,
            clip_record: state.record,
            clipped: state.clipped,
            fit_calls: state.fit_calls,
            sampling,
        })
    }

    fn clip_loop(
        &self,
        source: &str,
        state: &mut ClipState,
    ) -> Result<(ClipTermination, Dataset), AppError> {
        let mut dataset = self
            .loader
            .load(source, self.config, self.params, &state.clipped)?;
        let n_original = dataset.n_original();

        if self.config.max_clip_iters == 0 {
            let fit = self.fit_once(&dataset, false, state)?;
            return Ok((ClipTermination::Unclipped(fit), dataset));
        }

        for iter in 0..self.config.max_clip_iters {
            let fit = self.fit_once(&dataset, true, state)?;
            debug!(
                source,
                iter,
                rms = fit.rms,
                chi2red = fit.chi2red,
                outliers = fit.local_outliers().len(),
                "clip iteration"
            );

            if fit.local_outliers().is_empty() {
                return Ok((ClipTermination::Converged(fit), dataset));
            }

            let local = fit.local_outliers().to_vec();
            state.clipped = translate_clips(&state.clipped, &local, n_original)?;
            state.record.push(local);
            dataset = self
                .loader
                .load(source, self.config, self.params, &state.clipped)?;
        }

        let fit = self.fit_once(&dataset, false, state)?;
        Ok((ClipTermination::BudgetExhausted(fit), dataset))
    }

    fn fit_once(
        &self,
        dataset: &Dataset,
        detect_outliers: bool,
        state: &mut ClipState,
    ) -> Result<FitResult, AppError> {
        let model = Model::build(dataset, &self.config.functions, self.params)?;
        state.fit_calls += 1;
        self.fitter
            .fit(self.params, dataset, self.config, &model, detect_outliers)
    }
}

/// Mutable clip bookkeeping, private to one `run` call.
#[derive(Debug, Default)]
struct ClipState {
    record: ClipRecord,
    clipped: CumulativeClip,
    fit_calls: usize,
}
