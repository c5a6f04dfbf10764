//! pm-core: stable foundation for the prognostics framework.
//!
//! Contains:
//! - container (named vectors backed by a matrix, scalar or vectorized)
//! - params (model parameter mapping with nested values and snapshots)
//! - numeric (tolerances and float time comparisons)
//! - error (shared error types)

pub mod container;
pub mod error;
pub mod numeric;
pub mod params;

// Re-exports: nice ergonomics for downstream crates
pub use container::{FieldSet, FieldValue, Fields, VectorContainer};
pub use error::{PmError, PmResult};
pub use numeric::*;
pub use params::{ParamSnapshot, ParamValue, Parameters};
