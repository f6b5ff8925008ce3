//! Error type shared by the library and the `clipfit` binary.
//!
//! Every variant maps to a process exit code so the binary can stay a thin
//! wrapper (`main` prints the message and exits with [`AppError::exit_code`]).

use std::fmt;

use thiserror::Error;

/// Which index coordinate system an out-of-bounds index was expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFrame {
    /// Indices into the dataset as seen by the current clip iteration.
    Local,
    /// Indices into the unclipped (iteration-0) dataset.
    Original,
}

impl fmt::Display for IndexFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexFrame::Local => write!(f, "local"),
            IndexFrame::Original => write!(f, "original"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Malformed parameter table, mismatched shapes, invalid configuration.
    #[error("Input error: {0}")]
    Input(String),

    #[error("Index {index} out of bounds for {frame} frame of length {len}")]
    IndexOutOfBounds {
        frame: IndexFrame,
        index: usize,
        len: usize,
    },

    /// The fit collaborator failed to produce a usable solution.
    #[error("Fit failed: {0}")]
    FitDivergence(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Sampler error: {0}")]
    Sampler(String),
}

impl AppError {
    pub fn input(message: impl Into<String>) -> Self {
        AppError::Input(message.into())
    }

    pub fn divergence(message: impl Into<String>) -> Self {
        AppError::FitDivergence(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        AppError::Io(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Input(_) | AppError::Io(_) => 2,
            AppError::IndexOutOfBounds { .. } => 3,
            AppError::FitDivergence(_) => 4,
            AppError::Sampler(_) => 5,
        }
    }
}
