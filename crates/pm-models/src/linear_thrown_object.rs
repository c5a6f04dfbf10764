//! Thrown object written as a linear state-space model.

use nalgebra::DMatrix;
use pm_core::{FieldSet, Fields, Parameters, VectorContainer};
use pm_sim::{EventFlags, LinearMatrix, LinearModel, PrognosticsModel, SimResult};

/// `x' = v`, `v' = g`, output `x`.
///
/// The initial state comes from the `x0` parameter group (`x0.x`, `x0.v`).
/// Gravity is fixed in `E` at construction.
#[derive(Debug, Clone)]
pub struct LinearThrownObject {
    inner: LinearModel,
}

impl LinearThrownObject {
    pub fn new() -> SimResult<Self> {
        Self::with_gravity(-9.81, 1.83, 40.0)
    }

    pub fn with_gravity(g: f64, height: f64, speed: f64) -> SimResult<Self> {
        let states = FieldSet::fixed(&["x", "v"]);
        let outputs = FieldSet::fixed(&["x"]);
        let events = FieldSet::fixed(&["falling", "impact"]);
        let x_max = height + speed * speed / (2.0 * g.abs());

        let inner = LinearModel::new(
            &FieldSet::empty(),
            &states,
            &outputs,
            &events,
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        )?
        .with_matrix(LinearMatrix::E, DMatrix::from_column_slice(2, 1, &[0.0, g]))?
        .with_matrix(
            LinearMatrix::F,
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0 / speed, 1.0 / x_max, 0.0]),
        )?
        .with_parameters(
            Parameters::new().with("x0", Parameters::new().with("x", height).with("v", speed)),
        );
        Ok(Self { inner })
    }

    pub fn linear(&self) -> &LinearModel {
        &self.inner
    }
}

impl PrognosticsModel for LinearThrownObject {
    fn inputs(&self) -> &Fields {
        self.inner.inputs()
    }
    fn states(&self) -> &Fields {
        self.inner.states()
    }
    fn outputs(&self) -> &Fields {
        self.inner.outputs()
    }
    fn events(&self) -> &Fields {
        self.inner.events()
    }
    fn parameters(&self) -> &Parameters {
        self.inner.parameters()
    }
    fn parameters_mut(&mut self) -> &mut Parameters {
        self.inner.parameters_mut()
    }
    fn is_vectorized(&self) -> bool {
        true
    }

    fn initialize(
        &self,
        u: Option<&VectorContainer>,
        z: Option<&VectorContainer>,
    ) -> SimResult<VectorContainer> {
        self.inner.initialize(u, z)
    }

    fn dx(&self, t: f64, x: &VectorContainer, u: &VectorContainer) -> SimResult<VectorContainer> {
        self.inner.dx(t, x, u)
    }

    fn output(&self, t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        self.inner.output(t, x)
    }

    fn event_state(&self, t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        let mut es = self.inner.event_state(t, x)?;
        es.matrix_mut().apply(|v| *v = v.max(0.0));
        Ok(es)
    }

    fn threshold_met(&self, _t: f64, x: &VectorContainer) -> SimResult<EventFlags> {
        let m = x.matrix();
        let flags = DMatrix::from_fn(2, x.n_cols(), |r, c| {
            if r == 0 { m[(1, c)] < 0.0 } else { m[(0, c)] <= 0.0 }
        });
        EventFlags::new(self.events(), flags)
    }
}
