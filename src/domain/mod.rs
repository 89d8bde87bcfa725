//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the time-indexed table used for every series (`TimeSeries`)
//! - model outputs (`ModelOutput`, `SampledSeries`)
//! - inference windows (`InputShape`, `InputWindow`)
//! - the aggregated ensemble forecast (`ForecastBand`)

pub mod series;
pub mod types;

pub use series::*;
pub use types::*;
