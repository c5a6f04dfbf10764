//! Error calculation and parameter estimation for prognostics models.
//!
//! Observed data is given as times, inputs and outputs, either as one run or
//! nested to any depth as several runs. Each run is replayed through the
//! model from its first sample and compared against the observations.

pub mod calc_error;
pub mod config;
pub mod data;
pub mod error;
pub mod estimate;
pub mod metrics;
pub mod optimize;

pub use calc_error::{
    CalcErrorOptions, CalcWarning, DEFAULT_STABILITY_TOL, ErrorReport, calc_error,
    calc_error_report, calc_error_run,
};
pub use config::FitConfig;
pub use data::{Data, DataLocation, Run, RunData, normalize};
pub use error::{ErrorKind, EstimateError, EstimateResult};
pub use estimate::{EstimateOptions, EstimateReport, EstimateWarning, estimate_params};
pub use metrics::ErrorMethod;
pub use optimize::{
    OptimizerConfig, OptimizerMethod, OptimizerResult, central_difference_gradient, minimize,
};
