//! Input/output helpers.
//!
//! - light-curve ingest + dataset loaders (`ingest`)
//! - source discovery in natural order (`discover`)
//! - fit output directory layout (`rundir`)
//! - result exports (`export`)

pub mod discover;
pub mod export;
pub mod ingest;
pub mod rundir;

pub use discover::*;
pub use export::*;
pub use ingest::*;
pub use rundir::*;
