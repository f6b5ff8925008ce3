//! Data sources beyond files on disk.

pub mod synthetic;

pub use synthetic::*;
