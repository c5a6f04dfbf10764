//! Simulation runner and result recording.

use crate::error::{SimError, SimResult};
use crate::events::EventTracker;
use crate::integrator::IntegratorType;
use crate::model::{PrognosticsModel, check_state_fields};
use crate::noise::{NoiseConfig, NoiseSource};
use crate::result::{
    Divergence, LazySeries, ResultParts, SampleFn, Series, SimulationResult, Termination,
};
use pm_core::{VectorContainer, time_reached};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Options for simulation runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Integration step (seconds)
    pub dt: f64,
    /// Save interval (seconds), measured from `t0`
    pub save_freq: f64,
    /// Extra save times; steps are shortened to land on them
    pub save_pts: Vec<f64>,
    /// Start time (seconds)
    pub t0: f64,
    /// Initial state; `model.initialize` is used when absent
    #[serde(skip)]
    pub x0: Option<VectorContainer>,
    /// First output sample passed to `initialize`
    #[serde(skip)]
    pub first_output: Option<VectorContainer>,
    /// Time limit for threshold runs, relative to `t0`
    pub horizon: f64,
    /// Maximum number of steps (safety limit)
    pub max_steps: usize,
    /// Events that end a threshold run; empty means any event
    pub events: Vec<String>,
    pub integrator: IntegratorType,
    pub process_noise: NoiseConfig,
    pub measurement_noise: NoiseConfig,
    /// Noise seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            dt: 1.0,
            save_freq: 10.0,
            save_pts: Vec::new(),
            t0: 0.0,
            x0: None,
            first_output: None,
            horizon: f64::INFINITY,
            max_steps: 1_000_000,
            events: Vec::new(),
            integrator: IntegratorType::default(),
            process_noise: NoiseConfig::default(),
            measurement_noise: NoiseConfig::default(),
            seed: None,
        }
    }
}

impl SimOptions {
    fn validate(&self) -> SimResult<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidOption {
                what: format!("dt must be a finite value greater than 0, got {}", self.dt),
            });
        }
        if self.save_freq.is_nan() || self.save_freq <= 0.0 {
            return Err(SimError::InvalidOption {
                what: format!("save_freq must be greater than 0, got {}", self.save_freq),
            });
        }
        if !self.t0.is_finite() {
            return Err(SimError::InvalidArg {
                what: "t0 must be finite",
            });
        }
        if self.horizon.is_nan() || self.horizon < 0.0 {
            return Err(SimError::InvalidOption {
                what: format!("horizon must be non-negative, got {}", self.horizon),
            });
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        if let Some(bad) = self.save_pts.iter().find(|p| !p.is_finite()) {
            return Err(SimError::InvalidOption {
                what: format!("save_pts must be finite, got {bad}"),
            });
        }
        Ok(())
    }
}

/// Input profile that ignores time and state.
pub fn constant_load(u: VectorContainer) -> impl FnMut(f64, Option<&VectorContainer>) -> VectorContainer {
    move |_, _| u.clone()
}

/// Simulate `duration` seconds past `t0`. Thresholds are recorded but never stop the run.
pub fn simulate_to<M, L>(
    model: &M,
    duration: f64,
    loading: L,
    opts: &SimOptions,
) -> SimResult<SimulationResult>
where
    M: PrognosticsModel + ?Sized,
    L: FnMut(f64, Option<&VectorContainer>) -> VectorContainer,
{
    check_duration(duration)?;
    let run = run_loop(model, opts.t0 + duration, false, loading, opts)?;
    run.into_eager(model, opts)
}

/// Simulate until the selected events are met, `horizon` elapses or `max_steps` is hit.
pub fn simulate_to_threshold<M, L>(
    model: &M,
    loading: L,
    opts: &SimOptions,
) -> SimResult<SimulationResult>
where
    M: PrognosticsModel + ?Sized,
    L: FnMut(f64, Option<&VectorContainer>) -> VectorContainer,
{
    let run = run_loop(model, opts.t0 + opts.horizon, true, loading, opts)?;
    run.into_eager(model, opts)
}

/// Like [`simulate_to`], with outputs and event states computed on first access.
pub fn simulate_to_lazy<M, L>(
    model: &M,
    duration: f64,
    loading: L,
    opts: &SimOptions,
) -> SimResult<SimulationResult>
where
    M: PrognosticsModel + Clone + Send + Sync + 'static,
    L: FnMut(f64, Option<&VectorContainer>) -> VectorContainer,
{
    check_duration(duration)?;
    check_lazy_noise(opts)?;
    let run = run_loop(model, opts.t0 + duration, false, loading, opts)?;
    Ok(run.into_lazy(Arc::new(model.clone())))
}

/// Like [`simulate_to_threshold`], with outputs and event states computed on first access.
pub fn simulate_to_threshold_lazy<M, L>(
    model: &M,
    loading: L,
    opts: &SimOptions,
) -> SimResult<SimulationResult>
where
    M: PrognosticsModel + Clone + Send + Sync + 'static,
    L: FnMut(f64, Option<&VectorContainer>) -> VectorContainer,
{
    check_lazy_noise(opts)?;
    let run = run_loop(model, opts.t0 + opts.horizon, true, loading, opts)?;
    Ok(run.into_lazy(Arc::new(model.clone())))
}

fn check_duration(duration: f64) -> SimResult<()> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(SimError::InvalidOption {
            what: format!("duration must be finite and non-negative, got {duration}"),
        });
    }
    Ok(())
}

fn check_lazy_noise(opts: &SimOptions) -> SimResult<()> {
    if opts.measurement_noise.is_active() {
        return Err(SimError::InvalidOption {
            what: "measurement noise requires eagerly computed outputs".to_string(),
        });
    }
    Ok(())
}

/// Saved samples and metadata before outputs are attached.
struct RawRun {
    times: Vec<f64>,
    inputs: Vec<VectorContainer>,
    states: Vec<VectorContainer>,
    termination: Termination,
    divergence: Option<Divergence>,
    event_times: BTreeMap<String, f64>,
    noise: NoiseSource,
}

impl RawRun {
    fn push(&mut self, t: f64, u: &VectorContainer, x: &VectorContainer) {
        if self.times.last().is_some_and(|last| time_reached(*last, t)) {
            return;
        }
        self.times.push(t);
        self.inputs.push(u.clone());
        self.states.push(x.clone());
    }

    fn into_eager<M: PrognosticsModel + ?Sized>(
        mut self,
        model: &M,
        opts: &SimOptions,
    ) -> SimResult<SimulationResult> {
        let mut outputs = Vec::with_capacity(self.states.len());
        let mut event_states = Vec::with_capacity(self.states.len());
        for (t, x) in self.times.iter().zip(&self.states) {
            let mut z = model.output(*t, x)?;
            self.noise.apply(&opts.measurement_noise, &mut z, 1.0)?;
            outputs.push(z);
            event_states.push(model.event_state(*t, x)?);
        }
        Ok(SimulationResult::from_parts(ResultParts {
            times: self.times,
            inputs: self.inputs,
            states: self.states,
            outputs: Series::Eager(outputs),
            event_states: Series::Eager(event_states),
            termination: self.termination,
            divergence: self.divergence,
            event_times: self.event_times,
        }))
    }

    fn into_lazy<M>(self, model: Arc<M>) -> SimulationResult
    where
        M: PrognosticsModel + Send + Sync + 'static,
    {
        let times: Arc<[f64]> = Arc::from(self.times.as_slice());
        let states: Arc<[VectorContainer]> = Arc::from(self.states.as_slice());

        let m = Arc::clone(&model);
        let output_fn: SampleFn = Arc::new(move |t, x| m.output(t, x));
        let event_fn: SampleFn = Arc::new(move |t, x| model.event_state(t, x));

        SimulationResult::from_parts(ResultParts {
            outputs: Series::Lazy(LazySeries::new(
                Arc::clone(&times),
                Arc::clone(&states),
                output_fn,
            )),
            event_states: Series::Lazy(LazySeries::new(
                Arc::clone(&times),
                Arc::clone(&states),
                event_fn,
            )),
            times: self.times,
            inputs: self.inputs,
            states: self.states,
            termination: self.termination,
            divergence: self.divergence,
            event_times: self.event_times,
        })
    }
}

fn run_loop<M, L>(
    model: &M,
    end: f64,
    stop_on_threshold: bool,
    mut loading: L,
    opts: &SimOptions,
) -> SimResult<RawRun>
where
    M: PrognosticsModel + ?Sized,
    L: FnMut(f64, Option<&VectorContainer>) -> VectorContainer,
{
    opts.validate()?;
    let mut tracker = EventTracker::new(model.events(), &opts.events)?;
    if stop_on_threshold && model.events().is_empty() && !end.is_finite() {
        return Err(SimError::InvalidOption {
            what: "model has no events; a finite horizon is required".to_string(),
        });
    }

    let t0 = opts.t0;
    let mut t = t0;
    // One load per step: the t0 input serves initialize, the first sample and the first step.
    let mut u = VectorContainer::coerce(model.inputs(), &loading(t0, opts.x0.as_ref()));
    let mut x = match &opts.x0 {
        Some(x0) => {
            check_state_fields(model, x0)?;
            x0.clone()
        }
        None => model.initialize(Some(&u), opts.first_output.as_ref())?,
    };

    let noise = match opts.seed {
        Some(seed) => NoiseSource::seeded(seed),
        None => NoiseSource::from_entropy(),
    };

    let mut save_pts: Vec<f64> = opts.save_pts.iter().copied().filter(|p| *p > t0).collect();
    save_pts.sort_by(f64::total_cmp);
    let mut next_pt = 0;
    let mut next_save = t0 + opts.save_freq;

    debug!(t0, end, dt = opts.dt, integrator = ?opts.integrator, "simulation start");

    let mut run = RawRun {
        times: Vec::new(),
        inputs: Vec::new(),
        states: Vec::new(),
        termination: Termination::TimeReached,
        divergence: None,
        event_times: BTreeMap::new(),
        noise,
    };
    run.push(t, &u, &x);

    let initial = model.threshold_met(t, &x)?;
    if tracker.observe(t, &initial) && stop_on_threshold {
        run.termination = Termination::ThresholdMet {
            events: tracker.met_selected(&initial),
        };
        run.event_times = tracker.into_times();
        return Ok(run);
    }

    let mut steps = 0usize;
    loop {
        if time_reached(t, end) {
            run.termination = Termination::TimeReached;
            break;
        }
        if steps >= opts.max_steps {
            warn!(max_steps = opts.max_steps, t, "simulation stopped at max_steps");
            run.termination = Termination::MaxSteps;
            break;
        }

        if steps > 0 {
            u = VectorContainer::coerce(model.inputs(), &loading(t, Some(&x)));
        }
        let mut h = opts.dt.min(end - t);
        if let Some(pt) = save_pts.get(next_pt) {
            if *pt > t {
                h = h.min(pt - t);
            }
        }

        x = opts.integrator.step(model, t, &x, &u, h)?;
        run.noise.apply(&opts.process_noise, &mut x, h)?;
        t += h;
        steps += 1;

        let mut save = false;
        if time_reached(t, next_save) {
            save = true;
            while time_reached(t, next_save) {
                next_save += opts.save_freq;
            }
        }
        while save_pts.get(next_pt).is_some_and(|pt| time_reached(t, *pt)) {
            save = true;
            next_pt += 1;
        }

        if !x.is_finite() {
            debug!(t, step = steps, "state became non-finite");
            run.divergence = Some(Divergence { time: t, step: steps });
            run.termination = Termination::Diverged;
            break;
        }

        let flags = model.threshold_met(t, &x)?;
        if tracker.observe(t, &flags) && stop_on_threshold {
            run.termination = Termination::ThresholdMet {
                events: tracker.met_selected(&flags),
            };
            break;
        }

        if save {
            run.push(t, &u, &x);
        }
    }

    // Final sample is always kept.
    run.push(t, &u, &x);
    debug!(t, steps, termination = ?run.termination, saved = run.times.len(), "simulation end");

    run.event_times = tracker.into_times();
    Ok(run)
}
