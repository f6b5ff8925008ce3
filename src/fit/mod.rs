//! Clip-and-refit orchestration.
//!
//! Responsibilities:
//!
//! - translate local outlier indices into the original frame (`clip`)
//! - fit one dataset with least squares (`fitter`)
//! - run the clip loop for one dataset (`controller`)
//! - run the loop over an ordered batch of datasets (`batch`)

pub mod batch;
pub mod clip;
pub mod controller;
pub mod extract;
pub mod fitter;

pub use batch::*;
pub use clip::*;
pub use controller::*;
pub use extract::*;
pub use fitter::*;
