//! Shared pipeline steps used by every CLI command.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! catchment -> dataset -> build/load ensemble -> fit -> backtest/forecast
//!
//! The command handlers in `app.rs` then only deal with presentation.

use chrono::NaiveDateTime;
use tracing::info;

use crate::config::AppConfig;
use crate::data::{CatchmentData, CsvCatchment, SyntheticCatchment};
use crate::dataset::Dataset;
use crate::domain::{FeatureFrame, ForecastBand};
use crate::ensemble::{Forecaster, MemberSource};
use crate::error::AppError;
use crate::fit::{BacktestOptions, SearchOutcome, grid_search};
use crate::models::{LinearBlockBackend, ModelBackend};
use crate::report::{BandMetrics, evaluate_band};

/// Either configured CSV files or the synthetic generator.
#[derive(Debug, Clone)]
pub enum Catchment {
    Csv(CsvCatchment),
    Synthetic(SyntheticCatchment),
}

impl CatchmentData for Catchment {
    fn name(&self) -> &str {
        match self {
            Catchment::Csv(c) => c.name(),
            Catchment::Synthetic(c) => c.name(),
        }
    }

    fn all_historical_data(&self) -> Result<Vec<FeatureFrame>, AppError> {
        match self {
            Catchment::Csv(c) => c.all_historical_data(),
            Catchment::Synthetic(c) => c.all_historical_data(),
        }
    }

    fn all_current_data(&self) -> Result<Vec<FeatureFrame>, AppError> {
        match self {
            Catchment::Csv(c) => c.all_current_data(),
            Catchment::Synthetic(c) => c.all_current_data(),
        }
    }

    fn update_for_inference(&mut self) -> Result<(), AppError> {
        match self {
            Catchment::Csv(c) => c.update_for_inference(),
            Catchment::Synthetic(c) => c.update_for_inference(),
        }
    }

    fn current_data_as_of(&self, asof: NaiveDateTime) -> Result<Vec<FeatureFrame>, AppError> {
        match self {
            Catchment::Csv(c) => c.current_data_as_of(asof),
            Catchment::Synthetic(c) => c.current_data_as_of(asof),
        }
    }
}

pub type RiverForecaster = Forecaster<LinearBlockBackend, Catchment>;

pub fn open_catchment(config: &AppConfig, synthetic: bool) -> Result<Catchment, AppError> {
    if synthetic || !config.has_csv_catchment() {
        info!(catchment = %config.catchment.name, seed = config.synthetic.seed, "Using synthetic catchment");
        return Ok(Catchment::Synthetic(SyntheticCatchment::generate(
            &config.catchment.name,
            &config.synthetic,
        )?));
    }
    Ok(Catchment::Csv(CsvCatchment::load(
        &config.catchment.name,
        config.catchment.historical.clone(),
        config.catchment.current.clone(),
    )?))
}

/// Build or load the ensemble (no fitting).
pub fn build_forecaster(config: &AppConfig, synthetic: bool) -> Result<RiverForecaster, AppError> {
    let catchment = open_catchment(config, synthetic)?;
    Forecaster::new(
        catchment,
        &LinearBlockBackend,
        config.dataset.clone(),
        &config.model,
        config.forecaster.clone(),
    )
}

/// Fit freshly built members; loaded members are used as they are.
pub fn ensure_fitted<B: ModelBackend, C: CatchmentData>(
    forecaster: &mut Forecaster<B, C>,
    config: &AppConfig,
) -> Result<(), AppError> {
    if forecaster.source() == MemberSource::Built {
        forecaster.fit(&config.forecaster.train)?;
    }
    Ok(())
}

/// Build/load and fit if needed: the usual preamble of every command.
pub fn prepare(config: &AppConfig, synthetic: bool) -> Result<RiverForecaster, AppError> {
    let mut forecaster = build_forecaster(config, synthetic)?;
    ensure_fitted(&mut forecaster, config)?;
    Ok(forecaster)
}

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub band: ForecastBand,
    /// `None` when the band shares no timestamps with the observations.
    pub metrics: Option<BandMetrics>,
}

/// Backtest the ensemble and score it against the observed test levels.
pub fn run_backtest<B: ModelBackend, C: CatchmentData>(
    forecaster: &Forecaster<B, C>,
    opts: &BacktestOptions,
) -> Result<BacktestRun, AppError> {
    let band = forecaster.historical_forecasts(opts)?;
    let dataset = forecaster.dataset();
    let observed = dataset
        .scalers()
        .target
        .inverse_transform(&dataset.partitions().y_test)?;
    let metrics = evaluate_band(&band, &observed);
    Ok(BacktestRun { band, metrics })
}

/// Grid search on the first variant's training partition.
pub fn run_search(config: &AppConfig, synthetic: bool) -> Result<SearchOutcome, AppError> {
    let catchment = open_catchment(config, synthetic)?;
    let dataset = Dataset::new(&catchment, config.dataset.clone())?;
    let parts = dataset.partitions();
    grid_search(
        &LinearBlockBackend,
        &config.model,
        &parts.y_train,
        &parts.x_trains[0],
        &config.search,
    )
}
