//! Error between a model and observed runs, with instability policy.
//!
//! Each leaf run is replayed from `x0` (or the model's `initialize`) over the
//! run's own times and inputs. If a predicted output turns non-finite before
//! the cutoff time `t0 + stability_tol * (t_end - t0)` the calculation fails;
//! at or after the cutoff it warns and scores the finite prefix only.

use crate::data::{Data, DataLocation, Run, RunData, normalize};
use crate::error::{EstimateError, EstimateResult};
use crate::metrics::{ErrorAccumulator, ErrorMethod};
use pm_core::VectorContainer;
use pm_sim::{IntegratorType, PrognosticsModel, ReplayOptions, replay};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Default fraction of a run's duration before which divergence is fatal.
pub const DEFAULT_STABILITY_TOL: f64 = 0.95;

/// Options for [`calc_error`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcErrorOptions {
    /// One of mse, rmse, mae, mape, max_e
    pub method: String,
    /// Maximum replay substep (seconds); one step per sample interval when absent
    pub dt: Option<f64>,
    /// Initial state for every run; `initialize` is used when absent
    #[serde(skip)]
    pub x0: Option<VectorContainer>,
    /// Divergence cutoff as a fraction of each run's duration, in (0, 1]
    pub stability_tol: f64,
    pub integrator: IntegratorType,
}

impl Default for CalcErrorOptions {
    fn default() -> Self {
        Self {
            method: ErrorMethod::Mse.name().to_string(),
            dt: None,
            x0: None,
            stability_tol: DEFAULT_STABILITY_TOL,
            integrator: IntegratorType::default(),
        }
    }
}

/// Recoverable problems reported by [`calc_error_report`].
#[derive(Clone, Debug, PartialEq)]
pub enum CalcWarning {
    StabilityTolReset { received: f64 },
    UnstableAfterCutoff { time: f64, location: DataLocation },
}

impl fmt::Display for CalcWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcWarning::StabilityTolReset { received } => write!(
                f,
                "configurable cutoff must be some float value in the domain (0, 1]. Received {received}. Resetting value to {DEFAULT_STABILITY_TOL}"
            ),
            CalcWarning::UnstableAfterCutoff { time, .. } => {
                write!(f, "Model unstable- NaN reached in simulation (t={time})")
            }
        }
    }
}

/// Result of [`calc_error_report`].
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorReport {
    pub value: f64,
    pub method: ErrorMethod,
    pub warnings: Vec<CalcWarning>,
    pub runs: usize,
    /// Number of (sample, field) entries compared
    pub samples: usize,
    /// Stability tolerance actually applied
    pub stability_tol: f64,
}

/// Validated options, shared by every run.
#[derive(Clone, Debug)]
pub(crate) struct Prepared {
    pub(crate) method: ErrorMethod,
    pub(crate) replay: ReplayOptions,
    pub(crate) stability_tol: f64,
    pub(crate) x0: Option<VectorContainer>,
}

pub(crate) fn check_dt(dt: Option<f64>) -> EstimateResult<Option<f64>> {
    match dt {
        None => Ok(None),
        Some(v) if v.is_nan() => Err(EstimateError::DtType),
        Some(v) if v <= 0.0 => Err(EstimateError::DtValue { dt: v }),
        Some(v) if v.is_infinite() => Ok(None),
        Some(v) => Ok(Some(v)),
    }
}

pub(crate) fn check_stability_tol(
    tol: f64,
    warnings: &mut Vec<CalcWarning>,
) -> EstimateResult<f64> {
    if tol.is_nan() {
        return Err(EstimateError::StabilityTolType);
    }
    if tol <= 0.0 || tol > 1.0 {
        warnings.push(CalcWarning::StabilityTolReset { received: tol });
        return Ok(DEFAULT_STABILITY_TOL);
    }
    Ok(tol)
}

/// Validate options in pipeline order: dt, stability_tol, method, x0.
pub(crate) fn prepare<M: PrognosticsModel + ?Sized>(
    model: &M,
    opts: &CalcErrorOptions,
    warnings: &mut Vec<CalcWarning>,
) -> EstimateResult<Prepared> {
    let dt = check_dt(opts.dt)?;
    let stability_tol = check_stability_tol(opts.stability_tol, warnings)?;
    let method: ErrorMethod = opts.method.parse()?;
    if let Some(x0) = &opts.x0 {
        if x0.fields() != model.states() {
            return Err(EstimateError::X0Fields {
                expected: model.states().names().join(", "),
                actual: x0.keys().join(", "),
            });
        }
    }
    Ok(Prepared {
        method,
        replay: ReplayOptions {
            dt,
            integrator: opts.integrator,
        },
        stability_tol,
        x0: opts.x0.clone(),
    })
}

/// Score every run with one pooled accumulator.
pub(crate) fn evaluate_runs<M: PrognosticsModel + ?Sized>(
    model: &M,
    runs: &[Run],
    prep: &Prepared,
    warnings: &mut Vec<CalcWarning>,
) -> EstimateResult<(f64, usize)> {
    let mut acc = ErrorAccumulator::new(prep.method);
    for run in runs {
        score_run(model, run, prep, &mut acc, warnings)?;
    }
    let value = acc.finish().ok_or(EstimateError::NoComparableData)?;
    Ok((value, acc.count()))
}

fn score_run<M: PrognosticsModel + ?Sized>(
    model: &M,
    run: &Run,
    prep: &Prepared,
    acc: &mut ErrorAccumulator,
    warnings: &mut Vec<CalcWarning>,
) -> EstimateResult<()> {
    let inputs: Vec<VectorContainer> = run
        .inputs
        .iter()
        .map(|u| VectorContainer::coerce(model.inputs(), u))
        .collect();
    let x0 = match &prep.x0 {
        Some(x0) => x0.clone(),
        None => {
            let z0 = VectorContainer::coerce(model.outputs(), &run.outputs[0]);
            model.initialize(inputs.first(), Some(&z0))?
        }
    };

    let predicted = replay(model, &x0, &run.times, &inputs, &prep.replay)?;

    if let Some(div) = predicted.divergence {
        let (t0, t_end) = run.duration();
        let cutoff = t0 + prep.stability_tol * (t_end - t0);
        if div.time < cutoff {
            return Err(EstimateError::Unstable {
                time: div.time,
                cutoff,
                percent: prep.stability_tol * 100.0,
            });
        }
        warnings.push(CalcWarning::UnstableAfterCutoff {
            time: div.time,
            location: run.location.clone(),
        });
    }

    for (observed, z) in run.outputs.iter().zip(&predicted.outputs) {
        acc.add_sample(observed, z);
    }
    debug!(
        location = %run.location,
        samples = predicted.outputs.len(),
        "run scored"
    );
    Ok(())
}

/// Error between the model and observed data, with warnings and counts.
pub fn calc_error_report<M: PrognosticsModel + ?Sized>(
    model: &M,
    times: &Data,
    inputs: &Data,
    outputs: &Data,
    opts: &CalcErrorOptions,
) -> EstimateResult<ErrorReport> {
    let runs = normalize(times, inputs, outputs)?;
    let mut warnings = Vec::new();
    let result = prepare(model, opts, &mut warnings)
        .and_then(|prep| evaluate_runs(model, &runs, &prep, &mut warnings).map(|r| (prep, r)));
    for w in &warnings {
        warn!("{w}");
    }
    let (prep, (value, samples)) = result?;
    Ok(ErrorReport {
        value,
        method: prep.method,
        warnings,
        runs: runs.len(),
        samples,
        stability_tol: prep.stability_tol,
    })
}

/// Error between the model and observed data.
pub fn calc_error<M: PrognosticsModel + ?Sized>(
    model: &M,
    times: &Data,
    inputs: &Data,
    outputs: &Data,
    opts: &CalcErrorOptions,
) -> EstimateResult<f64> {
    calc_error_report(model, times, inputs, outputs, opts).map(|r| r.value)
}

/// [`calc_error`] on one [`RunData`].
pub fn calc_error_run<M: PrognosticsModel + ?Sized>(
    model: &M,
    run: &RunData,
    opts: &CalcErrorOptions,
) -> EstimateResult<f64> {
    calc_error(model, &run.times, &run.inputs, &run.outputs, opts)
}
