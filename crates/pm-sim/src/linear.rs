//! Linear time-invariant state-space model.
//!
//! ```text
//! dx/dt = A x + B u + E
//!     z = C x + D
//!    es = F x + G
//! ```
//!
//! All matrices are checked against the field counts on construction and on
//! every replacement, so a model that exists is always dimensionally valid.
//! The initial state is read from the `x0` parameter group (missing states
//! start at 0).

use crate::error::{SimError, SimResult};
use crate::model::PrognosticsModel;
use nalgebra::DMatrix;
use pm_core::{Fields, Parameters, PmError, PmResult, VectorContainer};
use std::sync::Arc;

/// Which matrix of a [`LinearModel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinearMatrix {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl LinearMatrix {
    const ALL: [LinearMatrix; 7] = [
        LinearMatrix::A,
        LinearMatrix::B,
        LinearMatrix::C,
        LinearMatrix::D,
        LinearMatrix::E,
        LinearMatrix::F,
        LinearMatrix::G,
    ];

    fn name(self) -> &'static str {
        match self {
            LinearMatrix::A => "A",
            LinearMatrix::B => "B",
            LinearMatrix::C => "C",
            LinearMatrix::D => "D",
            LinearMatrix::E => "E",
            LinearMatrix::F => "F",
            LinearMatrix::G => "G",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LinearModel {
    inputs: Fields,
    states: Fields,
    outputs: Fields,
    events: Fields,
    params: Parameters,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
    e: DMatrix<f64>,
    f: Option<DMatrix<f64>>,
    g: DMatrix<f64>,
}

impl LinearModel {
    /// Model with `B`, `D`, `E` and `G` zero and no event-state matrix `F`.
    pub fn new(
        inputs: &Fields,
        states: &Fields,
        outputs: &Fields,
        events: &Fields,
        a: DMatrix<f64>,
        c: DMatrix<f64>,
    ) -> SimResult<Self> {
        let (ns, ni, no, ne) = (states.len(), inputs.len(), outputs.len(), events.len());
        let model = Self {
            inputs: Arc::clone(inputs),
            states: Arc::clone(states),
            outputs: Arc::clone(outputs),
            events: Arc::clone(events),
            params: Parameters::new(),
            a,
            b: DMatrix::zeros(ns, ni),
            c,
            d: DMatrix::zeros(no, 1),
            e: DMatrix::zeros(ns, 1),
            f: None,
            g: DMatrix::zeros(ne, 1),
        };
        model.matrix_check()?;
        Ok(model)
    }

    pub fn with_matrix(mut self, which: LinearMatrix, m: DMatrix<f64>) -> SimResult<Self> {
        self.set_matrix(which, m)?;
        Ok(self)
    }

    pub fn with_parameters(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    /// Expected `(rows, cols)` of a matrix for this model's field counts.
    pub fn expected_shape(&self, which: LinearMatrix) -> (usize, usize) {
        let (ns, ni, no, ne) = (
            self.states.len(),
            self.inputs.len(),
            self.outputs.len(),
            self.events.len(),
        );
        match which {
            LinearMatrix::A => (ns, ns),
            LinearMatrix::B => (ns, ni),
            LinearMatrix::C => (no, ns),
            LinearMatrix::D => (no, 1),
            LinearMatrix::E => (ns, 1),
            LinearMatrix::F => (ne, ns),
            LinearMatrix::G => (ne, 1),
        }
    }

    pub fn matrix(&self, which: LinearMatrix) -> Option<&DMatrix<f64>> {
        match which {
            LinearMatrix::A => Some(&self.a),
            LinearMatrix::B => Some(&self.b),
            LinearMatrix::C => Some(&self.c),
            LinearMatrix::D => Some(&self.d),
            LinearMatrix::E => Some(&self.e),
            LinearMatrix::F => self.f.as_ref(),
            LinearMatrix::G => Some(&self.g),
        }
    }

    /// Replace one matrix. On a shape mismatch the model is left unchanged.
    pub fn set_matrix(&mut self, which: LinearMatrix, m: DMatrix<f64>) -> SimResult<()> {
        self.check_shape(which, &m)?;
        match which {
            LinearMatrix::A => self.a = m,
            LinearMatrix::B => self.b = m,
            LinearMatrix::C => self.c = m,
            LinearMatrix::D => self.d = m,
            LinearMatrix::E => self.e = m,
            LinearMatrix::F => self.f = Some(m),
            LinearMatrix::G => self.g = m,
        }
        Ok(())
    }

    /// Validate every matrix against the field counts.
    pub fn matrix_check(&self) -> SimResult<()> {
        for which in LinearMatrix::ALL {
            if let Some(m) = self.matrix(which) {
                self.check_shape(which, m)?;
            }
        }
        Ok(())
    }

    fn check_shape(&self, which: LinearMatrix, m: &DMatrix<f64>) -> SimResult<()> {
        let expected = self.expected_shape(which);
        if m.shape() != expected {
            return Err(SimError::MatrixShape {
                name: which.name(),
                expected,
                actual: m.shape(),
            });
        }
        Ok(())
    }
}

/// Add column vector `v` to every column of `m`.
fn add_column(m: &mut DMatrix<f64>, v: &DMatrix<f64>) {
    for j in 0..m.ncols() {
        for r in 0..m.nrows() {
            m[(r, j)] += v[(r, 0)];
        }
    }
}

/// Inputs with `n` columns as they are, a single column repeated `n` times.
fn broadcast(u: &DMatrix<f64>, n: usize) -> PmResult<DMatrix<f64>> {
    match u.ncols() {
        c if c == n => Ok(u.clone()),
        1 => Ok(DMatrix::from_fn(u.nrows(), n, |r, _| u[(r, 0)])),
        c => Err(PmError::ShapeMismatch {
            what: "inputs",
            expected: n,
            actual: c,
        }),
    }
}

impl PrognosticsModel for LinearModel {
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
        let mut x = VectorContainer::zeros(&self.states, 1);
        for name in self.states.iter() {
            let path = format!("x0.{name}");
            if self.params.contains(&path) {
                x.set(name, self.params.scalar(&path)?)?;
            }
        }
        Ok(x)
    }

    fn dx(&self, _t: f64, x: &VectorContainer, u: &VectorContainer) -> SimResult<VectorContainer> {
        let n = x.n_cols();
        let u = VectorContainer::coerce(&self.inputs, u);
        let mut xdot = &self.a * x.matrix() + &self.b * broadcast(u.matrix(), n)?;
        add_column(&mut xdot, &self.e);
        Ok(VectorContainer::from_matrix(&self.states, xdot)?)
    }

    fn output(&self, _t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        let mut z = &self.c * x.matrix();
        add_column(&mut z, &self.d);
        Ok(VectorContainer::from_matrix(&self.outputs, z)?)
    }

    fn event_state(&self, _t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        let Some(f) = &self.f else {
            let mut es = VectorContainer::zeros(&self.events, x.n_cols());
            es.matrix_mut().fill(f64::NAN);
            return Ok(es);
        };
        let mut es = f * x.matrix();
        add_column(&mut es, &self.g);
        Ok(VectorContainer::from_matrix(&self.events, es)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventFlags;
    use pm_core::FieldSet;

    fn one_state() -> LinearModel {
        let x = FieldSet::shared(["x"]).unwrap();
        let u = FieldSet::shared(["u"]).unwrap();
        let events = FieldSet::shared(["empty"]).unwrap();
        LinearModel::new(
            &u,
            &x,
            &x,
            &events,
            DMatrix::from_element(1, 1, -1.0),
            DMatrix::from_element(1, 1, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn wrong_shape_rejected_and_model_kept() {
        let mut m = one_state();
        let err = m
            .set_matrix(LinearMatrix::A, DMatrix::zeros(2, 2))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::MatrixShape {
                name: "A",
                expected: (1, 1),
                actual: (2, 2)
            }
        );
        assert_eq!(m.matrix(LinearMatrix::A).unwrap()[(0, 0)], -1.0);
        assert!(m.set_matrix(LinearMatrix::B, DMatrix::zeros(1, 2)).is_err());
        assert!(m.set_matrix(LinearMatrix::F, DMatrix::zeros(1, 2)).is_err());
        assert!(m.matrix(LinearMatrix::F).is_none());
        assert!(m.matrix_check().is_ok());
    }

    #[test]
    fn dx_combines_state_input_and_offset() {
        let m = one_state()
            .with_matrix(LinearMatrix::B, DMatrix::from_element(1, 1, 2.0))
            .unwrap()
            .with_matrix(LinearMatrix::E, DMatrix::from_element(1, 1, 0.5))
            .unwrap();
        let x = m.state_container([("x", 3.0)]);
        let u = m.input_container([("u", 1.0)]);
        let xdot = m.dx(0.0, &x, &u).unwrap();
        assert_eq!(xdot["x"], -3.0 + 2.0 + 0.5);
    }

    #[test]
    fn vectorized_columns_share_input() {
        let m = one_state()
            .with_matrix(LinearMatrix::B, DMatrix::from_element(1, 1, 1.0))
            .unwrap();
        let x = VectorContainer::from_matrix(m.states(), DMatrix::from_row_slice(1, 2, &[1.0, 2.0]))
            .unwrap();
        let u = m.input_container([("u", 1.0)]);
        let xdot = m.dx(0.0, &x, &u).unwrap();
        assert_eq!(xdot.matrix().as_slice(), &[0.0, -1.0]);
    }

    #[test]
    fn mismatched_input_columns_rejected() {
        let m = one_state();
        let x = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        let x = VectorContainer::from_matrix(m.states(), x).unwrap();
        let u = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let u = VectorContainer::from_matrix(m.inputs(), u).unwrap();
        let err = m.dx(0.0, &x, &u).unwrap_err();
        assert_eq!(
            err,
            SimError::Container(PmError::ShapeMismatch {
                what: "inputs",
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn event_state_from_f_and_g() {
        let m = one_state()
            .with_matrix(LinearMatrix::F, DMatrix::from_element(1, 1, 0.1))
            .unwrap()
            .with_matrix(LinearMatrix::G, DMatrix::from_element(1, 1, -0.5))
            .unwrap();
        let full = m.state_container([("x", 10.0)]);
        let low = m.state_container([("x", 2.0)]);
        assert_eq!(m.event_state(0.0, &full).unwrap()["empty"], 0.5);
        let flags: EventFlags = m.threshold_met(0.0, &low).unwrap();
        assert_eq!(flags.get("empty"), Some(true));
    }

    #[test]
    fn initial_state_from_parameters() {
        let m = one_state().with_parameters(
            Parameters::new().with("x0", Parameters::new().with("x", 4.0)),
        );
        assert_eq!(m.initialize(None, None).unwrap()["x"], 4.0);
    }
}
