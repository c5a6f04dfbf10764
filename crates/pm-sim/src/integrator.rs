//! Fixed-step state integrators.

use crate::error::SimResult;
use crate::model::PrognosticsModel;
use pm_core::VectorContainer;
use serde::{Deserialize, Serialize};

/// Trait for state integrators.
pub trait Integrator {
    /// Advance state by one time step, holding the input constant.
    fn step<M: PrognosticsModel + ?Sized>(
        &self,
        model: &M,
        t: f64,
        x: &VectorContainer,
        u: &VectorContainer,
        dt: f64,
    ) -> SimResult<VectorContainer>;
}

/// Integrator selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// The model's own `next_state` (default; works for discrete models).
    #[default]
    Model,
    /// Forward Euler on `dx` (1 derivative call per step).
    Euler,
    /// 4th-order Runge-Kutta on `dx` (4 derivative calls per step).
    Rk4,
}

impl IntegratorType {
    pub fn step<M: PrognosticsModel + ?Sized>(
        self,
        model: &M,
        t: f64,
        x: &VectorContainer,
        u: &VectorContainer,
        dt: f64,
    ) -> SimResult<VectorContainer> {
        match self {
            IntegratorType::Model => ModelStep.step(model, t, x, u, dt),
            IntegratorType::Euler => ForwardEuler.step(model, t, x, u, dt),
            IntegratorType::Rk4 => RK4.step(model, t, x, u, dt),
        }
    }
}

/// Delegates to the model's `next_state`.
#[derive(Clone, Debug)]
pub struct ModelStep;

impl Integrator for ModelStep {
    fn step<M: PrognosticsModel + ?Sized>(
        &self,
        model: &M,
        t: f64,
        x: &VectorContainer,
        u: &VectorContainer,
        dt: f64,
    ) -> SimResult<VectorContainer> {
        model.next_state(t, x, u, dt)
    }
}

/// Forward Euler (explicit, 1st order).
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step<M: PrognosticsModel + ?Sized>(
        &self,
        model: &M,
        t: f64,
        x: &VectorContainer,
        u: &VectorContainer,
        dt: f64,
    ) -> SimResult<VectorContainer> {
        let xdot = model.dx(t, x, u)?;
        Ok(x.add_scaled(&xdot, dt)?)
    }
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RK4;

impl Integrator for RK4 {
    fn step<M: PrognosticsModel + ?Sized>(
        &self,
        model: &M,
        t: f64,
        x: &VectorContainer,
        u: &VectorContainer,
        dt: f64,
    ) -> SimResult<VectorContainer> {
        let k1 = model.dx(t, x, u)?;

        let x2 = x.add_scaled(&k1, 0.5 * dt)?;
        let k2 = model.dx(t + 0.5 * dt, &x2, u)?;

        let x3 = x.add_scaled(&k2, 0.5 * dt)?;
        let k3 = model.dx(t + 0.5 * dt, &x3, u)?;

        let x4 = x.add_scaled(&k3, dt)?;
        let k4 = model.dx(t + dt, &x4, u)?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        let k_sum = k1
            .add_scaled(&k2, 2.0)?
            .add_scaled(&k3, 2.0)?
            .add_scaled(&k4, 1.0)?;

        Ok(x.add_scaled(&k_sum, dt / 6.0)?)
    }
}
