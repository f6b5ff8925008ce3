//! Synthetic light curves with injected outliers.
//!
//! Each channel is a constant-plus-slope light curve per visit with Gaussian
//! noise. A fixed number of rows per channel are pushed `outlier_sigma`
//! uncertainties away from the truth so the clip loop has something to find.
//! Everything is seeded, so a given spec always writes the same files.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Dataset, OriginalIndex};
use crate::error::AppError;
use crate::io::write_light_curve;

/// Name of the parameter table written next to the generated channels.
pub const PARAM_FILE: &str = "fit_par.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub n_channels: usize,
    pub points_per_visit: usize,
    pub nvisit: usize,
    /// Flux level of the first channel.
    pub baseline: f64,
    /// Slope in flux per unit time.
    pub slope: f64,
    /// Per-point uncertainty, relative to `baseline`.
    pub noise: f64,
    /// Outliers injected per channel.
    pub outliers: usize,
    /// Distance of each outlier from the truth, in uncertainties.
    pub outlier_sigma: f64,
    /// Time between consecutive points.
    pub cadence: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_channels: 5,
            points_per_visit: 60,
            nvisit: 1,
            baseline: 1.0,
            slope: 0.002,
            noise: 2e-4,
            outliers: 2,
            outlier_sigma: 12.0,
            cadence: 0.002,
            seed: 42,
        }
    }
}

/// One generated channel and the original rows that were made outliers.
#[derive(Debug, Clone)]
pub struct SyntheticChannel {
    pub dataset: Dataset,
    pub outliers: Vec<OriginalIndex>,
}

impl SyntheticSpec {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.n_channels == 0 || self.points_per_visit == 0 || self.nvisit == 0 {
            return Err(AppError::input(
                "Channels, points per visit and visits must all be > 0.",
            ));
        }
        if !(self.noise.is_finite() && self.noise > 0.0) {
            return Err(AppError::input("Noise must be finite and > 0."));
        }
        if !(self.cadence.is_finite() && self.cadence > 0.0) {
            return Err(AppError::input("Cadence must be finite and > 0."));
        }
        if !self.outlier_sigma.is_finite() {
            return Err(AppError::input("Outlier distance must be finite."));
        }
        if self.outliers >= self.points_per_visit * self.nvisit {
            return Err(AppError::input(format!(
                "Cannot inject {} outliers into {} points.",
                self.outliers,
                self.points_per_visit * self.nvisit
            )));
        }
        Ok(())
    }

    /// Source name of channel `i` (a wavelength-like numeric suffix).
    pub fn channel_name(&self, i: usize) -> String {
        format!("speclc{:.3}.txt", 1.1 + 0.025 * i as f64)
    }
}

pub fn generate_channels(spec: &SyntheticSpec) -> Result<Vec<SyntheticChannel>, AppError> {
    spec.validate()?;
    (0..spec.n_channels)
        .map(|i| generate_channel(spec, i))
        .collect()
}

fn generate_channel(spec: &SyntheticSpec, channel: usize) -> Result<SyntheticChannel, AppError> {
    let mut rng = StdRng::seed_from_u64(channel_seed(spec.seed, channel));
    let sigma = spec.noise * spec.baseline.abs().max(1e-12);
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| AppError::input(format!("Noise distribution error: {e}")))?;

    // Channels differ slightly in depth so the per-channel table is not flat.
    let level = spec.baseline * (1.0 - 1e-3 * channel as f64);
    let n = spec.points_per_visit * spec.nvisit;

    let mut t = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut visit = Vec::with_capacity(n);
    for v in 0..spec.nvisit {
        // Visits are separated by a gap much longer than a visit.
        let t0 = v as f64 * (spec.points_per_visit as f64 * spec.cadence * 10.0);
        for k in 0..spec.points_per_visit {
            let dt = k as f64 * spec.cadence;
            t.push(t0 + dt);
            y.push(level + spec.slope * dt + normal.sample(&mut rng));
            visit.push(v);
        }
    }

    let mut outliers: Vec<usize> = rand::seq::index::sample(&mut rng, n, spec.outliers).into_vec();
    outliers.sort_unstable();
    for &row in &outliers {
        let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        y[row] += sign * spec.outlier_sigma * sigma;
    }

    let dataset = Dataset::new(spec.channel_name(channel), t, y, vec![sigma; n], visit)?;
    Ok(SyntheticChannel {
        dataset,
        outliers: outliers.into_iter().map(OriginalIndex::new).collect(),
    })
}

/// Write every channel plus a matching parameter table into `dir`.
///
/// Returns the channel paths in channel order.
pub fn write_synthetic(dir: &Path, spec: &SyntheticSpec) -> Result<Vec<PathBuf>, AppError> {
    let channels = generate_channels(spec)?;
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", dir.display())))?;

    let mut paths = Vec::with_capacity(channels.len());
    for channel in &channels {
        let path = dir.join(channel.dataset.source());
        write_light_curve(&path, &channel.dataset)?;
        paths.push(path);
    }

    let params_path = dir.join(PARAM_FILE);
    fs::write(&params_path, default_param_table(spec)).map_err(|e| {
        AppError::io(format!("Failed to write '{}': {e}", params_path.display()))
    })?;
    Ok(paths)
}

/// Parameter table matching the generator: per-visit constant, shared slope.
pub fn default_param_table(spec: &SyntheticSpec) -> String {
    format!(
        "parameter,value,fixed,tied\nc,{},false,false\nv,0.0,false,true\n",
        spec.baseline
    )
}

fn channel_seed(seed: u64, channel: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    channel.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParameterTable;

    #[test]
    fn channels_are_deterministic_per_seed() {
        let spec = SyntheticSpec::default();
        let a = generate_channels(&spec).unwrap();
        let b = generate_channels(&spec).unwrap();
        assert_eq!(a.len(), spec.n_channels);
        assert_eq!(a[0].dataset, b[0].dataset);
        assert_eq!(a[3].outliers, b[3].outliers);
        assert_ne!(a[0].dataset.y(), a[1].dataset.y());
    }

    #[test]
    fn outliers_sit_far_from_the_line() {
        let spec = SyntheticSpec {
            n_channels: 1,
            nvisit: 2,
            ..SyntheticSpec::default()
        };
        let channel = &generate_channels(&spec).unwrap()[0];
        assert_eq!(channel.outliers.len(), spec.outliers);
        assert_eq!(channel.dataset.n_visits(), 2);
        for row in &channel.outliers {
            let i = row.get();
            let dt = channel.dataset.t()[i] - channel.dataset.visit_start(channel.dataset.visit()[i]);
            let truth = spec.baseline + spec.slope * dt;
            let pull = (channel.dataset.y()[i] - truth).abs() / channel.dataset.err()[i];
            assert!(pull > spec.outlier_sigma - 6.0, "pull {pull}");
        }
    }

    #[test]
    fn too_many_outliers_is_rejected() {
        let spec = SyntheticSpec {
            points_per_visit: 3,
            outliers: 3,
            ..SyntheticSpec::default()
        };
        assert!(matches!(generate_channels(&spec), Err(AppError::Input(_))));
    }

    #[test]
    fn writes_channels_and_param_table() {
        let dir = tempfile::tempdir().unwrap();
        let spec = SyntheticSpec {
            n_channels: 2,
            ..SyntheticSpec::default()
        };
        let paths = write_synthetic(dir.path(), &spec).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("speclc1.100.txt"));

        let reread = crate::io::read_light_curve(&paths[1]).unwrap();
        assert_eq!(reread.len(), spec.points_per_visit);

        let table = ParameterTable::read_csv(&dir.path().join(PARAM_FILE)).unwrap();
        assert_eq!(table.rows().len(), 2);
    }
}
