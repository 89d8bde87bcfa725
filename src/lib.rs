//! `rivercast` library crate.
//!
//! Ensemble river level forecasting: several models, one per feature-set
//! variant of a catchment, are trained on the same level series and their
//! forecasts are combined into a min/mean/max band.
//!
//! The binary (`rivercast`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the forecaster can be embedded in a long-running service
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod ensemble;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod prediction;
pub mod report;
