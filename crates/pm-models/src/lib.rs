//! pm-models: reference prognostics models.
//!
//! - `ThrownObject`: a ball thrown straight up, with `falling` and `impact` events
//! - `LinearThrownObject`: the same dynamics as a linear state-space model
//!
//! # Example
//!
//! ```no_run
//! use pm_models::ThrownObject;
//! use pm_sim::{SimOptions, PrognosticsModel, constant_load, simulate_to_threshold};
//! use pm_core::VectorContainer;
//!
//! let m = ThrownObject::new();
//! let load = constant_load(VectorContainer::zeros(m.inputs(), 1));
//! let opts = SimOptions { dt: 0.01, events: vec!["impact".into()], ..SimOptions::default() };
//! let r = simulate_to_threshold(&m, load, &opts).unwrap();
//! println!("impact at {:?} s", r.event_time("impact"));
//! ```

pub mod linear_thrown_object;
pub mod thrown_object;

pub use linear_thrown_object::LinearThrownObject;
pub use thrown_object::ThrownObject;
