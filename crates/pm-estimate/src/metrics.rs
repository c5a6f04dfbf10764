//! Error metrics between observed and predicted outputs.

use crate::error::EstimateError;
use pm_core::VectorContainer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error metric selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMethod {
    /// Mean squared error
    #[default]
    Mse,
    /// Root mean squared error
    Rmse,
    /// Mean absolute error
    Mae,
    /// Mean absolute percentage error (zero observations skipped)
    Mape,
    /// Maximum absolute error
    MaxE,
}

impl ErrorMethod {
    pub fn name(self) -> &'static str {
        match self {
            ErrorMethod::Mse => "mse",
            ErrorMethod::Rmse => "rmse",
            ErrorMethod::Mae => "mae",
            ErrorMethod::Mape => "mape",
            ErrorMethod::MaxE => "max_e",
        }
    }
}

impl fmt::Display for ErrorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ErrorMethod {
    type Err = EstimateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mse" => Ok(ErrorMethod::Mse),
            "rmse" => Ok(ErrorMethod::Rmse),
            "mae" => Ok(ErrorMethod::Mae),
            "mape" => Ok(ErrorMethod::Mape),
            "max_e" => Ok(ErrorMethod::MaxE),
            _ => Err(EstimateError::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Running aggregate over every valid (sample, field) entry.
#[derive(Clone, Debug)]
pub(crate) struct ErrorAccumulator {
    method: ErrorMethod,
    sum: f64,
    max: f64,
    count: usize,
}

impl ErrorAccumulator {
    pub(crate) fn new(method: ErrorMethod) -> Self {
        Self {
            method,
            sum: 0.0,
            max: 0.0,
            count: 0,
        }
    }

    /// Add one entry. Non-finite observations are skipped.
    pub(crate) fn add(&mut self, observed: f64, predicted: f64) {
        if !observed.is_finite() || !predicted.is_finite() {
            return;
        }
        if self.method == ErrorMethod::Mape && observed == 0.0 {
            return;
        }
        let diff = (predicted - observed).abs();
        match self.method {
            ErrorMethod::Mse | ErrorMethod::Rmse => self.sum += diff * diff,
            ErrorMethod::Mae => self.sum += diff,
            ErrorMethod::Mape => self.sum += diff / observed.abs(),
            ErrorMethod::MaxE => self.max = self.max.max(diff),
        }
        self.count += 1;
    }

    /// Compare every predicted field against the observed value of the same name (first column).
    pub(crate) fn add_sample(&mut self, observed: &VectorContainer, predicted: &VectorContainer) {
        for (name, z) in predicted.items() {
            if let Some(obs) = observed.scalar(name) {
                self.add(obs, z);
            }
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// `None` when no entry was comparable.
    pub(crate) fn finish(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(match self.method {
            ErrorMethod::Mse | ErrorMethod::Mae | ErrorMethod::Mape => self.sum / n,
            ErrorMethod::Rmse => (self.sum / n).sqrt(),
            ErrorMethod::MaxE => self.max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn score(method: ErrorMethod, pairs: &[(f64, f64)]) -> Option<f64> {
        let mut acc = ErrorAccumulator::new(method);
        for (obs, pred) in pairs {
            acc.add(*obs, *pred);
        }
        acc.finish()
    }

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("MSE".parse::<ErrorMethod>().unwrap(), ErrorMethod::Mse);
        assert_eq!("max_e".parse::<ErrorMethod>().unwrap(), ErrorMethod::MaxE);
        let err = "Test".parse::<ErrorMethod>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error method 'Test' not supported. Supported methods: mse, rmse, mae, mape, max_e"
        );
    }

    #[test]
    fn metrics_on_known_values() {
        let pairs = [(1.0, 2.0), (2.0, 4.0), (4.0, 4.0)];
        assert_eq!(score(ErrorMethod::Mse, &pairs), Some(5.0 / 3.0));
        assert_eq!(score(ErrorMethod::Rmse, &pairs), Some((5.0_f64 / 3.0).sqrt()));
        assert_eq!(score(ErrorMethod::Mae, &pairs), Some(1.0));
        assert_eq!(score(ErrorMethod::Mape, &pairs), Some(2.0 / 3.0));
        assert_eq!(score(ErrorMethod::MaxE, &pairs), Some(2.0));
    }

    #[test]
    fn mape_skips_zero_observations() {
        assert_eq!(score(ErrorMethod::Mape, &[(0.0, 1.0), (2.0, 3.0)]), Some(0.5));
        assert_eq!(score(ErrorMethod::Mape, &[(0.0, 1.0)]), None);
    }

    #[test]
    fn missing_observations_are_excluded() {
        assert_eq!(score(ErrorMethod::Mse, &[(f64::NAN, 1.0), (1.0, 3.0)]), Some(4.0));
        assert_eq!(score(ErrorMethod::Mse, &[]), None);
    }

    proptest! {
        #[test]
        fn rmse_is_sqrt_of_mse_and_bounded_by_max(
            pairs in prop::collection::vec((-100.0..100.0f64, -100.0..100.0f64), 1..20)
        ) {
            let mse = score(ErrorMethod::Mse, &pairs).unwrap();
            let rmse = score(ErrorMethod::Rmse, &pairs).unwrap();
            let mae = score(ErrorMethod::Mae, &pairs).unwrap();
            let max_e = score(ErrorMethod::MaxE, &pairs).unwrap();
            prop_assert!((rmse - mse.sqrt()).abs() <= 1e-12 * (1.0 + rmse));
            prop_assert!(mae <= rmse + 1e-9);
            prop_assert!(rmse <= max_e + 1e-9);
        }
    }
}
