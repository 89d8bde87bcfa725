//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env`, sets up logging and parses CLI arguments
//! - resolves the TOML config plus environment overrides
//! - dispatches to a command handler, which runs the pipeline
//! - prints reports and writes optional exports

use std::path::{Path, PathBuf};

use chrono::Duration;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{BacktestArgs, Cli, Command, DemoArgs, ForecastArgs, RangeArgs, RunArgs, SimulateArgs};
use crate::config::AppConfig;
use crate::data::CatchmentData;
use crate::error::AppError;
use crate::fit::BacktestOptions;
use crate::prediction::InMemoryStore;
use crate::report::{format_band, format_metrics, format_range_report, format_search};

pub mod pipeline;
pub mod simulate;

/// Rows of a backtest band shown on the terminal.
const BACKTEST_ROWS: usize = 24;

/// Entry point for the `rivercast` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Train(args) => handle_train(config, &args),
        Command::Backtest(args) => handle_backtest(config, &args),
        Command::Forecast(args) => handle_forecast(config, &args),
        Command::Range(args) => handle_range(config, &args),
        Command::Simulate(args) => handle_simulate(config, &args),
        Command::Search(args) => handle_search(config, &args),
        Command::Demo(args) => handle_demo(config, &args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rivercast=info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Config file (or defaults), then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, AppError> {
    let mut config = match path {
        Some(p) => AppConfig::load(p)?,
        None => AppConfig::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn apply_run_args(config: &mut AppConfig, run: &RunArgs) {
    if run.overwrite {
        config.forecaster.overwrite_models = true;
    }
    if run.sequential {
        config.forecaster.train.parallel = false;
    }
}

fn handle_train(mut config: AppConfig, args: &RunArgs) -> Result<(), AppError> {
    apply_run_args(&mut config, args);
    let mut forecaster = pipeline::build_forecaster(&config, args.synthetic)?;
    forecaster.fit(&config.forecaster.train)?;
    println!(
        "Fitted {} models for '{}' (checkpoints: {})",
        forecaster.members().len(),
        forecaster.catchment().name(),
        forecaster.checkpoint_root().display()
    );
    Ok(())
}

fn handle_backtest(mut config: AppConfig, args: &BacktestArgs) -> Result<(), AppError> {
    apply_run_args(&mut config, &args.run);
    let opts = BacktestOptions {
        forecast_horizon: args.horizon.unwrap_or(config.backtest.forecast_horizon),
        num_samples: args.num_samples.unwrap_or(config.backtest.num_samples),
        ..config.backtest
    };
    opts.validate()?;

    let forecaster = pipeline::prepare(&config, args.run.synthetic)?;
    let run = pipeline::run_backtest(&forecaster, &opts)?;

    match &run.metrics {
        Some(m) => print!("{}", format_metrics(m)),
        None => println!("Backtest band does not overlap the observed test levels"),
    }
    print!("{}", format_band(&run.band, Some(BACKTEST_ROWS)));

    if let Some(path) = &args.export {
        crate::io::write_band_csv(path, &run.band)?;
    }
    Ok(())
}

fn handle_forecast(mut config: AppConfig, args: &ForecastArgs) -> Result<(), AppError> {
    apply_run_args(&mut config, &args.run);
    let forecaster = pipeline::prepare(&config, args.run.synthetic)?;
    let band = forecaster.forecast_for_hours(args.hours, args.num_samples)?;
    print!("{}", format_band(&band, None));

    if let Some(path) = &args.export {
        crate::io::write_band_csv(path, &band)?;
    }
    Ok(())
}

fn handle_range(mut config: AppConfig, args: &RangeArgs) -> Result<(), AppError> {
    if args.end <= args.start {
        return Err(AppError::Config(format!(
            "range end {} is not after start {}",
            args.end, args.start
        )));
    }
    apply_run_args(&mut config, &args.run);
    let mut forecaster = pipeline::prepare(&config, args.run.synthetic)?;
    if args.update {
        forecaster.update_input_data()?;
    }

    let mut store = InMemoryStore::new();
    let report = forecaster.forecast_for_range(args.start, args.end, &mut store)?;
    print!("{}", format_range_report(&report));
    Ok(())
}

fn handle_simulate(mut config: AppConfig, args: &SimulateArgs) -> Result<(), AppError> {
    apply_run_args(&mut config, &args.run);
    let forecaster = pipeline::prepare(&config, args.run.synthetic)?;
    let run = simulate::simulate_past_inference(&forecaster, &args.origins, args.hours, args.num_samples)?;

    for (origin, band) in &run.bands {
        println!("Forecast issued at {origin}:");
        print!("{}", format_band(band, None));
    }
    for (origin, reason) in &run.skipped {
        println!("Skipped origin {origin}: {reason}");
    }

    if let Some(path) = &args.export {
        crate::io::write_simulation_csv(path, &run.bands)?;
    }
    Ok(())
}

fn handle_search(mut config: AppConfig, args: &RunArgs) -> Result<(), AppError> {
    apply_run_args(&mut config, args);
    let outcome = pipeline::run_search(&config, args.synthetic)?;
    print!("{}", format_search(&outcome));

    let best = outcome.best_params(&config.model);
    println!(
        "Best: input_chunk_length={} output_chunk_length={}",
        best.input_chunk_length, best.output_chunk_length
    );
    Ok(())
}

/// Full walk-through on a synthetic catchment: fit, backtest, forecast, then
/// hourly inference before and after a data refresh.
fn handle_demo(mut config: AppConfig, args: &DemoArgs) -> Result<(), AppError> {
    if let Some(seed) = args.seed {
        config.synthetic.seed = seed;
    }
    config.forecaster.parent_dir = args.dir.clone().unwrap_or_else(|| demo_dir(config.synthetic.seed));
    config.forecaster.overwrite_models = true;
    info!(dir = %config.forecaster.parent_dir.display(), "Running demo");

    let mut forecaster = pipeline::prepare(&config, true)?;
    if let Some(dir) = &args.export_frames {
        export_frames(forecaster.catchment(), dir)?;
    }

    let backtest = pipeline::run_backtest(&forecaster, &config.backtest)?;
    println!("== Backtest ==");
    if let Some(m) = &backtest.metrics {
        print!("{}", format_metrics(m));
    }
    print!("{}", format_band(&backtest.band, Some(BACKTEST_ROWS)));

    println!("\n== Forecast ({}h) ==", args.hours);
    let band = forecaster.forecast_for_hours(args.hours, 100)?;
    print!("{}", format_band(&band, None));

    let Some(now) = forecaster.prediction_set().snapshot().frame().end() else {
        return Ok(());
    };
    // The hour after next has no complete window until the data is refreshed.
    let start = now - Duration::hours(3);
    let end = now + Duration::hours(3);

    println!("\n== Hourly inference ==");
    let mut store = InMemoryStore::new();
    let report = forecaster.forecast_for_range(start, end, &mut store)?;
    print!("{}", format_range_report(&report));

    println!("\n== After refresh ==");
    forecaster.update_input_data()?;
    let report = forecaster.forecast_for_range(start, end, &mut store)?;
    print!("{}", format_range_report(&report));
    Ok(())
}

/// Writes `historical_<i>.csv` and `current_<i>.csv` per variant.
fn export_frames<C: CatchmentData>(catchment: &C, dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("failed to create '{}'", dir.display()), e))?;
    for (kind, frames) in [
        ("historical", catchment.all_historical_data()?),
        ("current", catchment.all_current_data()?),
    ] {
        for (i, frame) in frames.iter().enumerate() {
            crate::io::write_frame_csv(&dir.join(format!("{kind}_{i}.csv")), frame)?;
        }
    }
    info!(dir = %dir.display(), "Exported catchment frames");
    Ok(())
}

fn demo_dir(seed: u64) -> PathBuf {
    std::env::temp_dir().join(format!("rivercast-demo-{seed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_override_config() {
        let mut config = AppConfig::default();
        apply_run_args(
            &mut config,
            &RunArgs {
                synthetic: true,
                overwrite: true,
                sequential: true,
            },
        );
        assert!(config.forecaster.overwrite_models);
        assert!(!config.forecaster.train.parallel);
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let err = load_config(Some(Path::new("/nonexistent/rivercast.toml"))).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
