//! Open-loop replay of a model against recorded input samples.

use crate::error::{SimError, SimResult};
use crate::integrator::IntegratorType;
use crate::model::{PrognosticsModel, check_state_fields};
use crate::result::Divergence;
use pm_core::VectorContainer;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayOptions {
    /// Maximum substep; `None` takes one step per sample interval.
    pub dt: Option<f64>,
    pub integrator: IntegratorType,
}

/// Predicted outputs, one per sample up to (excluding) the first non-finite one.
#[derive(Clone, Debug)]
pub struct Replay {
    pub outputs: Vec<VectorContainer>,
    pub divergence: Option<Divergence>,
}

/// Advance `x0` through `times`, applying `inputs[i]` over the interval ending at `times[i]`.
///
/// Predicted outputs are compared only up to the first non-finite output,
/// at which point replay stops and reports the divergence.
pub fn replay<M: PrognosticsModel + ?Sized>(
    model: &M,
    x0: &VectorContainer,
    times: &[f64],
    inputs: &[VectorContainer],
    opts: &ReplayOptions,
) -> SimResult<Replay> {
    if times.len() != inputs.len() {
        return Err(SimError::InvalidOption {
            what: format!(
                "replay needs one input per time, got {} times and {} inputs",
                times.len(),
                inputs.len()
            ),
        });
    }
    check_state_fields(model, x0)?;
    let dt = match opts.dt {
        Some(dt) if !dt.is_finite() || dt <= 0.0 => {
            return Err(SimError::InvalidOption {
                what: format!("replay dt must be finite and greater than 0, got {dt}"),
            });
        }
        Some(dt) => dt,
        None => f64::INFINITY,
    };

    let mut outputs = Vec::with_capacity(times.len());
    let mut divergence = None;
    let mut x = x0.clone();
    let Some(mut t_last) = times.first().copied() else {
        return Ok(Replay {
            outputs,
            divergence,
        });
    };

    for (i, (t, u)) in times.iter().copied().zip(inputs).enumerate() {
        let u = VectorContainer::coerce(model.inputs(), u);
        while t_last < t {
            let mut t_new = (t_last + dt).min(t);
            if t_new <= t_last {
                t_new = t;
            }
            x = opts.integrator.step(model, t_last, &x, &u, t_new - t_last)?;
            t_last = t_new;
        }
        let z = model.output(t, &x)?;
        if !z.is_finite() {
            divergence = Some(Divergence { time: t, step: i });
            break;
        }
        outputs.push(z);
    }

    Ok(Replay {
        outputs,
        divergence,
    })
}
