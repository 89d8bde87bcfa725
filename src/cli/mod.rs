//! Command-line parsing for the river level forecaster.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline code. Anything not given on the command line comes from the TOML
//! config (`--config`) or its defaults.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};

use crate::io::frames::parse_timestamp;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rivercast", version, about = "Ensemble river level forecaster")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build (or load) the ensemble and fit every member.
    Train(RunArgs),
    /// Rolling backtest over the held-out test partition.
    Backtest(BacktestArgs),
    /// Forecast forward from the current data.
    Forecast(ForecastArgs),
    /// Single-timestamp forecasts for every hour in a range.
    Range(RangeArgs),
    /// Re-run past forecasts from current data as it looked at each origin.
    Simulate(SimulateArgs),
    /// Grid search over input/output chunk lengths.
    Search(RunArgs),
    /// Run the whole pipeline on a seeded synthetic catchment.
    ///
    /// No input files are needed; checkpoints go to a fresh directory unless
    /// `--dir` is given.
    Demo(DemoArgs),
}

/// Options shared by every command that builds a forecaster.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Use the synthetic catchment even if CSV files are configured.
    #[arg(long)]
    pub synthetic: bool,

    /// Rebuild models even if checkpoints exist.
    #[arg(long)]
    pub overwrite: bool,

    /// Fit and predict members one at a time.
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Args, Clone)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Hours ahead of each forecast origin.
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Draws per forecast for probabilistic members.
    #[arg(long)]
    pub num_samples: Option<usize>,

    /// Write the band to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[arg(long, default_value_t = 24)]
    pub hours: usize,

    #[arg(long, default_value_t = 100)]
    pub num_samples: usize,

    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RangeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// First hour to forecast (inclusive).
    #[arg(long, value_parser = parse_timestamp)]
    pub start: NaiveDateTime,

    /// Last hour (exclusive).
    #[arg(long, value_parser = parse_timestamp)]
    pub end: NaiveDateTime,

    /// Refresh current data before forecasting.
    #[arg(long)]
    pub update: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Forecast origins; repeat the flag for several.
    #[arg(long = "origin", value_parser = parse_timestamp, required = true)]
    pub origins: Vec<NaiveDateTime>,

    #[arg(long, default_value_t = 24)]
    pub hours: usize,

    #[arg(long, default_value_t = 100)]
    pub num_samples: usize,

    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Forecast length in hours.
    #[arg(long, default_value_t = 24)]
    pub hours: usize,

    /// Seed for the synthetic catchment.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Checkpoint parent directory.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Write the synthetic frames as CSV files usable by a `[catchment]` config.
    #[arg(long, value_name = "DIR")]
    pub export_frames: Option<PathBuf>,
}
