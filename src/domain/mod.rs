//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the two index frames (`LocalIndex`, `OriginalIndex`) and clip bookkeeping
//!   (`ClipRecord`, `CumulativeClip`)
//! - datasets, fit results and loop terminations
//! - the run configuration (`RunConfig`)
//! - the parameter table and the expanded `ParameterVector`

pub mod params;
pub mod types;

pub use params::*;
pub use types::*;
