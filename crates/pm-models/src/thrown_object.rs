//! Object thrown vertically from a given height.

use nalgebra::DMatrix;
use pm_core::{FieldSet, Fields, Parameters, VectorContainer};
use pm_sim::{EventFlags, PrognosticsModel, SimResult, clamp_unit};

/// Ball thrown straight up: states `x` (height, m) and `v` (velocity, m/s).
///
/// Events are `falling` (velocity turns negative) and `impact` (height reaches
/// the ground). Parameters: `thrower_height`, `throwing_speed`, `g`.
#[derive(Debug, Clone)]
pub struct ThrownObject {
    inputs: Fields,
    states: Fields,
    outputs: Fields,
    events: Fields,
    params: Parameters,
}

impl Default for ThrownObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrownObject {
    pub fn new() -> Self {
        Self::with_parameters(Self::default_parameters())
    }

    pub fn with_parameters(params: Parameters) -> Self {
        Self {
            inputs: FieldSet::empty(),
            states: FieldSet::fixed(&["x", "v"]),
            outputs: FieldSet::fixed(&["x"]),
            events: FieldSet::fixed(&["falling", "impact"]),
            params,
        }
    }

    pub fn default_parameters() -> Parameters {
        Parameters::new()
            .with("thrower_height", 1.83)
            .with("throwing_speed", 40.0)
            .with("g", -9.81)
    }

    /// Apex height for the current parameters.
    pub fn max_height(&self) -> SimResult<f64> {
        let h = self.params.scalar("thrower_height")?;
        let v0 = self.params.scalar("throwing_speed")?;
        let g = self.params.scalar("g")?;
        Ok(h + v0 * v0 / (2.0 * g.abs()))
    }
}

impl PrognosticsModel for ThrownObject {
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

    fn is_vectorized(&self) -> bool {
        true
    }

    fn initialize(
        &self,
        _u: Option<&VectorContainer>,
        _z: Option<&VectorContainer>,
    ) -> SimResult<VectorContainer> {
        Ok(VectorContainer::from_column(
            &self.states,
            &[
                self.params.scalar("thrower_height")?,
                self.params.scalar("throwing_speed")?,
            ],
        )?)
    }

    fn dx(&self, _t: f64, x: &VectorContainer, _u: &VectorContainer) -> SimResult<VectorContainer> {
        let g = self.params.scalar("g")?;
        let n = x.n_cols();
        let m = x.matrix();
        let xdot = DMatrix::from_fn(2, n, |r, c| if r == 0 { m[(1, c)] } else { g });
        Ok(VectorContainer::from_matrix(&self.states, xdot)?)
    }

    fn output(&self, _t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        Ok(VectorContainer::coerce(&self.outputs, x))
    }

    fn event_state(&self, _t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        let v0 = self.params.scalar("throwing_speed")?;
        let x_max = self.max_height()?;
        let m = x.matrix();
        let es = DMatrix::from_fn(2, x.n_cols(), |r, c| {
            if r == 0 {
                clamp_unit(m[(1, c)] / v0)
            } else {
                clamp_unit(m[(0, c)] / x_max)
            }
        });
        Ok(VectorContainer::from_matrix(&self.events, es)?)
    }

    fn threshold_met(&self, _t: f64, x: &VectorContainer) -> SimResult<EventFlags> {
        let m = x.matrix();
        let flags = DMatrix::from_fn(2, x.n_cols(), |r, c| {
            if r == 0 { m[(1, c)] < 0.0 } else { m[(0, c)] <= 0.0 }
        });
        EventFlags::new(&self.events, flags)
    }
}
