#![allow(dead_code)]

use pm_core::{FieldSet, Fields, Parameters, VectorContainer};
use pm_estimate::RunData;
use pm_models::ThrownObject;
use pm_sim::{PrognosticsModel, SimOptions, SimResult, constant_load, simulate_to};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Thrown-object trajectory sampled every 0.5 s for 8 s.
pub fn thrown_run(model: &ThrownObject) -> RunData {
    let opts = SimOptions {
        dt: 0.5,
        save_freq: 0.5,
        ..SimOptions::default()
    };
    let no_input = VectorContainer::zeros(&FieldSet::empty(), 1);
    let result = simulate_to(model, 8.0, constant_load(no_input), &opts).unwrap();
    assert_eq!(result.len(), 17);
    RunData::from_result(&result).unwrap()
}

pub fn thrown_with_speed(speed: f64) -> ThrownObject {
    let mut m = ThrownObject::new();
    m.parameters_mut().set_scalar("throwing_speed", speed).unwrap();
    m
}

/// Exponential decay `x' = -k x` observed directly, whose output turns NaN
/// from `fail_at` onwards.
#[derive(Clone)]
pub struct Decay {
    inputs: Fields,
    states: Fields,
    outputs: Fields,
    events: Fields,
    params: Parameters,
}

impl Decay {
    pub fn new(k: f64, fail_at: f64) -> Self {
        Self {
            inputs: FieldSet::empty(),
            states: FieldSet::fixed(&["x"]),
            outputs: FieldSet::fixed(&["x"]),
            events: FieldSet::empty(),
            params: Parameters::new()
                .with("k", k)
                .with("x0", 10.0)
                .with("fail_at", fail_at),
        }
    }

    /// One observed run at integer times `0..=n`, following Euler at dt = 1.
    pub fn observed(k: f64, n: usize) -> RunData {
        let fields = FieldSet::fixed(&["x"]);
        let mut x = 10.0;
        let mut times = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for i in 0..=n {
            times.push(i as f64);
            inputs.push(VectorContainer::zeros(&FieldSet::empty(), 1));
            outputs.push(VectorContainer::from_column(&fields, &[x]).unwrap());
            x -= k * x;
        }
        RunData::new(times, inputs, outputs)
    }
}

impl PrognosticsModel for Decay {
    fn inputs(&self) -> &Fields {
        &self.inputs
    }
    fn states(&self) -> &Fields {
        &self.states
    }
    fn outputs(&self) -> &Fields {
        &self.outputs
    }
    fn events(&self) -> &Fields {
        &self.events
    }
    fn parameters(&self) -> &Parameters {
        &self.params
    }
    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    fn initialize(
        &self,
        _u: Option<&VectorContainer>,
        _z: Option<&VectorContainer>,
    ) -> SimResult<VectorContainer> {
        Ok(self.state_container([("x", self.params.scalar("x0")?)]))
    }

    fn dx(&self, _t: f64, x: &VectorContainer, _u: &VectorContainer) -> SimResult<VectorContainer> {
        let k = self.params.scalar("k")?;
        let mut d = x.clone();
        d["x"] = -k * x["x"];
        Ok(d)
    }

    fn output(&self, t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        let mut z = VectorContainer::coerce(&self.outputs, x);
        if t >= self.params.scalar("fail_at")? {
            z["x"] = f64::NAN;
        }
        Ok(z)
    }
}
