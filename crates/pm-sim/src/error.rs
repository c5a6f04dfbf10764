//! Error types for simulation operations.

use thiserror::Error;

/// Errors encountered during simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Invalid option: {what}")]
    InvalidOption { what: String },

    #[error("Not supported by this model: {what}")]
    NotSupported { what: &'static str },

    #[error("Matrix {name} has shape {actual:?}, expected {expected:?}")]
    MatrixShape {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Noise configuration error: {what}")]
    Noise { what: String },

    #[error("Container error: {0}")]
    Container(#[from] pm_core::PmError),
}

pub type SimResult<T> = Result<T, SimError>;
