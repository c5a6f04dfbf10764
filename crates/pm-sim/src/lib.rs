//! Simulation framework for prognostics models.
//!
//! Provides:
//! - The `PrognosticsModel` trait and a linear state-space model
//! - Fixed-step integrators (model step, forward Euler, RK4)
//! - Time- and threshold-terminated simulation with eager or lazy outputs
//! - Seeded process and measurement noise
//! - Open-loop replay against recorded inputs

pub mod error;
pub mod events;
pub mod integrator;
pub mod linear;
pub mod model;
pub mod noise;
pub mod replay;
pub mod result;
pub mod sim;

pub use error::{SimError, SimResult};
pub use events::clamp_unit;
pub use integrator::{ForwardEuler, Integrator, IntegratorType, ModelStep, RK4};
pub use linear::{LinearMatrix, LinearModel};
pub use model::{EventFlags, PrognosticsModel, check_state_fields};
pub use noise::{NoiseConfig, NoiseDistribution, NoiseLevel, NoiseSource};
pub use replay::{Replay, ReplayOptions, replay};
pub use result::{Divergence, LazySeries, SampleFn, Series, SimulationResult, Termination};
pub use sim::{
    SimOptions, constant_load, simulate_to, simulate_to_lazy, simulate_to_threshold,
    simulate_to_threshold_lazy,
};
