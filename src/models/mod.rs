//! Model function set and model evaluation.
//!
//! Models are linear in their free parameters so the fitter can stay a plain
//! weighted least-squares solve.

pub mod model;

pub use model::*;
