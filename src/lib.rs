//! `clipfit` library crate.
//!
//! The binary (`clipfit`) is a thin wrapper around this library so that:
//!
//! - the clip loop and batch runner are testable without spawning processes
//! - loaders, fitters and samplers can be swapped behind their traits

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod sample;
