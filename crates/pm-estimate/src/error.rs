//! Error types for error calculation and parameter estimation.

use crate::data::DataLocation;
use pm_core::PmError;
use pm_sim::SimError;
use thiserror::Error;

/// Coarse classification of an [`EstimateError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong data or option type.
    Type,
    /// Structurally valid but semantically invalid input.
    Value,
    /// Unrecognized method or key name.
    Input,
    /// Divergence before the stability cutoff.
    Instability,
    /// Failure inside the model or simulator.
    Simulation,
}

/// Errors that can occur during error calculation and fitting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error("Argument '{arg}' must be {expected}, not {type_name}{}", .location.suffix())]
    DataType {
        arg: &'static str,
        expected: &'static str,
        type_name: &'static str,
        location: DataLocation,
    },

    #[error(
        "Times, inputs, and outputs must all be the same length. Current lengths are: times = {times}, inputs = {inputs}, outputs = {outputs}{}",
        .location.suffix()
    )]
    LengthMismatch {
        times: usize,
        inputs: usize,
        outputs: usize,
        location: DataLocation,
    },

    #[error("Times, inputs, and outputs must all be nested to the same depth{}", .location.suffix())]
    Ragged { location: DataLocation },

    #[error("Must provide at least 2 data points for times, inputs, and outputs{}", .location.suffix())]
    MinPoints { location: DataLocation },

    #[error("Keyword argument 'dt' must be initialized to a value greater than 0. Currently passed in {dt}")]
    DtValue { dt: f64 },

    #[error("Keyword argument 'dt' must be either a int, float, or double.")]
    DtType,

    #[error("Keyword argument 'stability_tol' must be either a int, float, or double.")]
    StabilityTolType,

    #[error("Error method '{method}' not supported. Supported methods: mse, rmse, mae, mape, max_e")]
    UnsupportedMethod { method: String },

    #[error("Optimization method '{method}' not supported. Supported methods: Nelder-Mead, Powell, CG")]
    UnsupportedOptimizer { method: String },

    #[error(
        "Keyword argument 'x0' must be initialized to a StateContainer with fields [{expected}]. You passed in x0 with fields [{actual}]."
    )]
    X0Fields { expected: String, actual: String },

    #[error(
        "Model unstable- NaN reached in simulation (t={time}) before cutoff threshold. Cutoff threshold is {cutoff}, or roughly {percent:.1}% of the data"
    )]
    Unstable { time: f64, cutoff: f64, percent: f64 },

    #[error("No finite observed output values to compare")]
    NoComparableData,

    #[error("At least one run must be provided")]
    NoRuns,

    #[error("At least one parameter key must be provided")]
    NoKeys,

    #[error("Invalid bounds for '{key}': [{lower}, {upper}]")]
    InvalidBounds { key: String, lower: f64, upper: f64 },

    #[error("Bounds given for '{key}', which is not being fitted")]
    UnknownBoundsKey { key: String },

    #[error("Configuration error: {what}")]
    Config { what: String },

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("Container error: {0}")]
    Core(#[from] PmError),
}

impl EstimateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EstimateError::DataType { .. }
            | EstimateError::DtType
            | EstimateError::StabilityTolType
            | EstimateError::X0Fields { .. } => ErrorKind::Type,
            EstimateError::LengthMismatch { .. }
            | EstimateError::Ragged { .. }
            | EstimateError::MinPoints { .. }
            | EstimateError::DtValue { .. }
            | EstimateError::NoComparableData
            | EstimateError::NoRuns
            | EstimateError::InvalidBounds { .. } => ErrorKind::Value,
            EstimateError::UnsupportedMethod { .. }
            | EstimateError::UnsupportedOptimizer { .. }
            | EstimateError::NoKeys
            | EstimateError::UnknownBoundsKey { .. }
            | EstimateError::Config { .. } => ErrorKind::Input,
            EstimateError::Unstable { .. } => ErrorKind::Instability,
            EstimateError::Sim(_) => ErrorKind::Simulation,
            EstimateError::Core(e) => match e {
                PmError::UnsupportedData { .. } | PmError::NotScalar { .. } => ErrorKind::Type,
                PmError::UnknownParameter { .. } | PmError::UnknownField { .. } => ErrorKind::Input,
                _ => ErrorKind::Value,
            },
        }
    }

    /// Value errors include instability before the cutoff.
    pub fn is_value_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Value | ErrorKind::Instability)
    }

    pub fn is_type_error(&self) -> bool {
        self.kind() == ErrorKind::Type
    }
}

pub type EstimateResult<T> = Result<T, EstimateError>;
