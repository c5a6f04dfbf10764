//! Parameter estimation: fit scalar model parameters to observed runs.
//!
//! Every input is validated before the model is touched. During the search
//! the model's parameters are overwritten at each candidate point; when the
//! search ends they hold either the best finite point or, if no candidate
//! produced a finite error, the values they had on entry.

use crate::calc_error::{CalcErrorOptions, CalcWarning, DEFAULT_STABILITY_TOL, Prepared, evaluate_runs, prepare};
use crate::data::{Run, RunData};
use crate::error::{EstimateError, EstimateResult};
use crate::metrics::ErrorMethod;
use crate::optimize::{OptimizerConfig, OptimizerMethod, minimize};
use nalgebra::DVector;
use pm_core::VectorContainer;
use pm_sim::{IntegratorType, PrognosticsModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Options for [`estimate_params`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateOptions {
    /// Optimizer name: Nelder-Mead, Powell or CG
    pub method: String,
    /// Error metric name, as for `calc_error`
    pub error_method: String,
    pub dt: Option<f64>,
    pub stability_tol: f64,
    #[serde(skip)]
    pub x0: Option<VectorContainer>,
    /// Inclusive `(lower, upper)` per fitted key
    pub bounds: BTreeMap<String, (f64, f64)>,
    pub optimizer: OptimizerConfig,
    pub integrator: IntegratorType,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            method: OptimizerMethod::default().to_string(),
            error_method: ErrorMethod::default().name().to_string(),
            dt: None,
            stability_tol: DEFAULT_STABILITY_TOL,
            x0: None,
            bounds: BTreeMap::new(),
            optimizer: OptimizerConfig::default(),
            integrator: IntegratorType::default(),
        }
    }
}

impl EstimateOptions {
    fn calc_options(&self) -> CalcErrorOptions {
        CalcErrorOptions {
            method: self.error_method.clone(),
            dt: self.dt,
            x0: self.x0.clone(),
            stability_tol: self.stability_tol,
            integrator: self.integrator,
        }
    }
}

/// Recoverable problems reported by [`estimate_params`].
#[derive(Clone, Debug, PartialEq)]
pub enum EstimateWarning {
    Calc(CalcWarning),
    /// No candidate produced a finite error; parameters were restored.
    NoFiniteError,
    NotConverged { iterations: usize, evaluations: usize },
}

impl fmt::Display for EstimateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateWarning::Calc(w) => fmt::Display::fmt(w, f),
            EstimateWarning::NoFiniteError => f.write_str(
                "No parameter set produced a finite error; parameters restored to their initial values",
            ),
            EstimateWarning::NotConverged {
                iterations,
                evaluations,
            } => write!(
                f,
                "Optimizer did not converge after {iterations} iterations ({evaluations} evaluations)"
            ),
        }
    }
}

/// Outcome of [`estimate_params`].
#[derive(Clone, Debug, PartialEq)]
pub struct EstimateReport {
    pub keys: Vec<String>,
    /// Start point of the search, clamped into the bounds
    pub initial: Vec<f64>,
    /// Values written to the model
    pub values: Vec<f64>,
    /// Error at the start point (`+inf` if it could not be computed)
    pub initial_error: f64,
    pub final_error: f64,
    pub method: OptimizerMethod,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub warnings: Vec<EstimateWarning>,
}

impl EstimateReport {
    /// Fitted value of `key`.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.values[i])
    }
}

/// Everything validated up front.
struct Problem {
    keys: Vec<String>,
    initial: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    runs: Vec<Vec<Run>>,
    prep: Prepared,
    method: OptimizerMethod,
}

impl Problem {
    fn in_bounds(&self, x: &DVector<f64>) -> bool {
        x.iter()
            .zip(&self.bounds)
            .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }
}

fn validate<M, K>(
    model: &M,
    runs: &[RunData],
    keys: &[K],
    opts: &EstimateOptions,
    warnings: &mut Vec<CalcWarning>,
) -> EstimateResult<Problem>
where
    M: PrognosticsModel + ?Sized,
    K: AsRef<str>,
{
    if keys.is_empty() {
        return Err(EstimateError::NoKeys);
    }
    let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
    let initial = keys
        .iter()
        .map(|k| model.parameters().scalar(k))
        .collect::<Result<Vec<f64>, _>>()?;

    if runs.is_empty() {
        return Err(EstimateError::NoRuns);
    }
    let runs = runs
        .iter()
        .map(RunData::normalize)
        .collect::<EstimateResult<Vec<_>>>()?;

    let prep = prepare(model, &opts.calc_options(), warnings)?;
    let method: OptimizerMethod = opts.method.parse()?;

    if let Some(key) = opts.bounds.keys().find(|k| !keys.contains(*k)) {
        return Err(EstimateError::UnknownBoundsKey { key: key.clone() });
    }
    let mut bounds = Vec::with_capacity(keys.len());
    for key in &keys {
        let (lower, upper) = opts
            .bounds
            .get(key)
            .copied()
            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(EstimateError::InvalidBounds {
                key: key.clone(),
                lower,
                upper,
            });
        }
        bounds.push((lower, upper));
    }

    Ok(Problem {
        keys,
        initial,
        bounds,
        runs,
        prep,
        method,
    })
}

/// Mean per-run error at the model's current parameters.
fn mean_error<M: PrognosticsModel + ?Sized>(model: &M, problem: &Problem) -> EstimateResult<f64> {
    // Warnings raised while scoring candidates are not reported.
    let mut scratch = Vec::new();
    let mut total = 0.0;
    for runs in &problem.runs {
        let (value, _) = evaluate_runs(model, runs, &problem.prep, &mut scratch)?;
        total += value;
    }
    Ok(total / problem.runs.len() as f64)
}

fn write_params<M: PrognosticsModel + ?Sized>(
    model: &mut M,
    keys: &[String],
    x: &DVector<f64>,
) -> EstimateResult<()> {
    for (key, v) in keys.iter().zip(x.iter()) {
        model.parameters_mut().set_scalar(key, *v)?;
    }
    Ok(())
}

/// Fit the scalar parameters named by `keys` to `runs`.
///
/// Each entry of `runs` may itself hold nested runs. The objective is the
/// mean of the per-entry errors; candidates outside `bounds` or whose error
/// cannot be computed score `+inf`.
pub fn estimate_params<M, K>(
    model: &mut M,
    runs: &[RunData],
    keys: &[K],
    opts: &EstimateOptions,
) -> EstimateResult<EstimateReport>
where
    M: PrognosticsModel + ?Sized,
    K: AsRef<str>,
{
    let mut calc_warnings = Vec::new();
    let validated = validate(&*model, runs, keys, opts, &mut calc_warnings);
    for w in &calc_warnings {
        warn!("{w}");
    }
    let problem = validated?;
    let mut warnings: Vec<EstimateWarning> =
        calc_warnings.into_iter().map(EstimateWarning::Calc).collect();

    let start = DVector::from_iterator(
        problem.initial.len(),
        problem
            .initial
            .iter()
            .zip(&problem.bounds)
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi)),
    );
    let start_values: Vec<f64> = start.iter().copied().collect();

    let snapshot = model.parameters().snapshot();
    write_params(model, &problem.keys, &start)?;
    let initial_error = mean_error(&*model, &problem).unwrap_or(f64::INFINITY);

    let result = minimize(
        problem.method,
        start,
        |x| {
            if !problem.in_bounds(x) {
                return f64::INFINITY;
            }
            if write_params(model, &problem.keys, x).is_err() {
                return f64::INFINITY;
            }
            match mean_error(&*model, &problem) {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "candidate rejected");
                    f64::INFINITY
                }
            }
        },
        &opts.optimizer,
    );

    model.parameters_mut().restore(&snapshot);
    let (values, final_error) = if result.fx.is_finite() {
        write_params(model, &problem.keys, &result.x)?;
        (result.x.iter().copied().collect(), result.fx)
    } else {
        let w = EstimateWarning::NoFiniteError;
        warn!("{w}");
        warnings.push(w);
        (problem.initial.clone(), initial_error)
    };

    if !result.converged {
        let w = EstimateWarning::NotConverged {
            iterations: result.iterations,
            evaluations: result.evaluations,
        };
        warn!("{w}");
        warnings.push(w);
    }

    info!(
        method = %problem.method,
        keys = ?problem.keys,
        initial = ?start_values,
        values = ?values,
        initial_error,
        final_error,
        evaluations = result.evaluations,
        converged = result.converged,
        "parameter estimation finished"
    );

    Ok(EstimateReport {
        keys: problem.keys,
        initial: start_values,
        values,
        initial_error,
        final_error,
        method: problem.method,
        iterations: result.iterations,
        evaluations: result.evaluations,
        converged: result.converged,
        warnings,
    })
}
