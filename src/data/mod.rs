//! Catchment data sources.
//!
//! - `catchment`: the `CatchmentData` contract plus a CSV-backed source
//! - `synthetic`: seeded synthetic weather/level frames for demos and tests

pub mod catchment;
pub mod synthetic;

pub use catchment::*;
pub use synthetic::*;
