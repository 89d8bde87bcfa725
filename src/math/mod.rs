//! Mathematical utilities: ridge least squares, grids and summary statistics.

pub mod grid;
pub mod ols;
pub mod stats;

pub use grid::*;
pub use ols::*;
pub use stats::*;
