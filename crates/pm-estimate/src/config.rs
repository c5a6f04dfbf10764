//! YAML fit configuration.
//!
//! ```yaml
//! keys: [throwing_speed]
//! parameters:
//!   g: -9.81
//! method: Powell
//! error_method: rmse
//! bounds:
//!   throwing_speed: [20, 60]
//! ```

use crate::data::RunData;
use crate::error::{EstimateError, EstimateResult};
use crate::estimate::{EstimateOptions, EstimateReport, estimate_params};
use pm_core::{Parameters, PmError};
use pm_sim::PrognosticsModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Keys to fit, parameter overrides applied first, and estimation options.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub keys: Vec<String>,
    /// Replaces whole top-level entries of the model's parameters
    pub parameters: Parameters,
    #[serde(flatten)]
    pub options: EstimateOptions,
}

impl FitConfig {
    pub fn from_yaml_str(content: &str) -> EstimateResult<Self> {
        serde_yaml::from_str(content).map_err(|e| EstimateError::Config {
            what: e.to_string(),
        })
    }

    pub fn load_yaml(path: &Path) -> EstimateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EstimateError::Config {
            what: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> EstimateResult<String> {
        serde_yaml::to_string(self).map_err(|e| EstimateError::Config {
            what: e.to_string(),
        })
    }

    /// Apply the overrides to `model`, then fit.
    ///
    /// Override names must already exist on the model. If the fit fails
    /// its validation the overrides are rolled back.
    pub fn apply<M: PrognosticsModel + ?Sized>(
        &self,
        model: &mut M,
        runs: &[RunData],
    ) -> EstimateResult<EstimateReport> {
        if let Some(name) = self
            .parameters
            .keys()
            .find(|k| !model.parameters().contains(k))
        {
            return Err(PmError::UnknownParameter {
                name: name.to_string(),
            }
            .into());
        }
        let snapshot = model.parameters().snapshot();
        model.parameters_mut().merge(&self.parameters);
        let report = estimate_params(model, runs, &self.keys, &self.options);
        if report.is_err() {
            model.parameters_mut().restore(&snapshot);
        }
        report
    }
}
