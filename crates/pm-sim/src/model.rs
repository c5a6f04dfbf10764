//! PrognosticsModel trait for degrading physical systems.

use crate::error::{SimError, SimResult};
use nalgebra::DMatrix;
use pm_core::{Fields, Parameters, VectorContainer};
use std::sync::Arc;

/// Per-event, per-column threshold flags.
#[derive(Clone, Debug, PartialEq)]
pub struct EventFlags {
    events: Fields,
    flags: DMatrix<bool>,
}

impl EventFlags {
    /// Flags with one row per event and one column per simulation instance.
    pub fn new(events: &Fields, flags: DMatrix<bool>) -> SimResult<Self> {
        if flags.nrows() != events.len() {
            return Err(SimError::MatrixShape {
                name: "threshold flags",
                expected: (events.len(), flags.ncols()),
                actual: flags.shape(),
            });
        }
        Ok(Self {
            events: Arc::clone(events),
            flags,
        })
    }

    /// Scalar-mode flags in event order.
    pub fn from_flags(events: &Fields, flags: &[bool]) -> SimResult<Self> {
        Self::new(events, DMatrix::from_column_slice(flags.len(), 1, flags))
    }

    /// True if any event is met in any column.
    pub fn any(&self) -> bool {
        self.flags.iter().any(|f| *f)
    }

    /// Flag of one event in the first column.
    pub fn get(&self, event: &str) -> Option<bool> {
        let i = self.events.index_of(event)?;
        self.flags.get((i, 0)).copied()
    }

    /// Names of events met in any column.
    pub fn met_events(&self) -> Vec<String> {
        self.events
            .iter()
            .enumerate()
            .filter(|(i, _)| self.flags.row(*i).iter().any(|f| *f))
            .map(|(_, name)| name.to_string())
            .collect()
    }

    /// True when every column has met at least one of `selected` (all events when empty).
    pub fn all_columns_met(&self, selected: &[String]) -> bool {
        let rows: Vec<usize> = if selected.is_empty() {
            (0..self.events.len()).collect()
        } else {
            selected
                .iter()
                .filter_map(|name| self.events.index_of(name))
                .collect()
        };
        if rows.is_empty() || self.flags.ncols() == 0 {
            return false;
        }
        (0..self.flags.ncols()).all(|c| rows.iter().any(|r| self.flags[(*r, c)]))
    }

    pub fn events(&self) -> &Fields {
        &self.events
    }
}

/// Trait implemented by every prognostics model.
///
/// A model declares its field schemas and parameters and provides the state
/// machine: `initialize` produces `x0`, `next_state` (or `dx`, integrated by
/// the caller) advances it, `output`, `event_state` and `threshold_met` are
/// pure functions of the state. Models never apply noise themselves.
pub trait PrognosticsModel {
    fn inputs(&self) -> &Fields;
    fn states(&self) -> &Fields;
    fn outputs(&self) -> &Fields;
    fn events(&self) -> &Fields;

    fn parameters(&self) -> &Parameters;

    /// Mutable parameter access. Safe only from a single thread at a time.
    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Whether the model accepts multi-column (batched) containers.
    fn is_vectorized(&self) -> bool {
        false
    }

    /// Initial state from the first input and output samples.
    fn initialize(
        &self,
        u: Option<&VectorContainer>,
        z: Option<&VectorContainer>,
    ) -> SimResult<VectorContainer>;

    /// Continuous-time derivative dx/dt = f(t, x, u).
    fn dx(&self, _t: f64, _x: &VectorContainer, _u: &VectorContainer) -> SimResult<VectorContainer> {
        Err(SimError::NotSupported { what: "dx" })
    }

    /// Discrete state update. Defaults to a forward Euler step on `dx`.
    fn next_state(
        &self,
        t: f64,
        x: &VectorContainer,
        u: &VectorContainer,
        dt: f64,
    ) -> SimResult<VectorContainer> {
        let xdot = self.dx(t, x, u)?;
        Ok(x.add_scaled(&xdot, dt)?)
    }

    /// Measured outputs; depends on state only.
    fn output(&self, t: f64, x: &VectorContainer) -> SimResult<VectorContainer>;

    /// Event progress in [0, 1], 1 healthy and 0 failed. NaN when not modeled.
    fn event_state(&self, _t: f64, x: &VectorContainer) -> SimResult<VectorContainer> {
        let mut es = VectorContainer::zeros(self.events(), x.n_cols());
        es.matrix_mut().fill(f64::NAN);
        Ok(es)
    }

    /// Authoritative termination signal. Defaults to `event_state <= 0`.
    fn threshold_met(&self, t: f64, x: &VectorContainer) -> SimResult<EventFlags> {
        let es = self.event_state(t, x)?;
        EventFlags::new(self.events(), es.matrix().map(|v| v <= 0.0))
    }

    fn input_container<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, f64)>) -> VectorContainer
    where
        Self: Sized,
    {
        VectorContainer::from_pairs(self.inputs(), pairs)
    }

    fn state_container<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, f64)>) -> VectorContainer
    where
        Self: Sized,
    {
        VectorContainer::from_pairs(self.states(), pairs)
    }

    fn output_container<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, f64)>) -> VectorContainer
    where
        Self: Sized,
    {
        VectorContainer::from_pairs(self.outputs(), pairs)
    }
}

/// Check that `x` carries exactly the model's state fields.
pub fn check_state_fields<M: PrognosticsModel + ?Sized>(
    model: &M,
    x: &VectorContainer,
) -> SimResult<()> {
    if x.fields() != model.states() {
        return Err(SimError::InvalidOption {
            what: format!(
                "state fields [{}] do not match model states [{}]",
                x.keys().join(", "),
                model.states().names().join(", ")
            ),
        });
    }
    Ok(())
}
