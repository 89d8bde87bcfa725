//! Model evaluation.
//!
//! Responsibilities:
//!
//! - rolling, non-retraining backtests of a fitted model (`backtest`)
//! - grid search over chunk lengths, scored on a held-out tail (`search`)

pub mod backtest;
pub mod search;

pub use backtest::*;
pub use search::*;
