//! Input/output helpers.
//!
//! - frame CSV read/write (`frames`)
//! - forecast exports (`export`)
//! - model checkpoint JSON (`checkpoint`)

pub mod checkpoint;
pub mod export;
pub mod frames;

pub use export::*;
pub use frames::*;
