//! Ensemble orchestration.
//!
//! A [`Forecaster`] owns one model per feature-set variant and presents them
//! as a single forecaster:
//!
//! - construction prepares the [`Dataset`] and builds or loads every member
//! - `fit` trains members on the shared target with their own covariates
//! - `historical_forecasts` / `forecast_for_hours` run every member, convert
//!   outputs to physical units and aggregate them into a [`ForecastBand`]
//! - `forecast_for` / `forecast_for_range` serve single-timestamp requests from
//!   the live [`PredictionSet`]
//!
//! Members are independent, so fitting and prediction fan out with `rayon` and
//! join before aggregation.

pub mod aggregate;

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::CatchmentData;
use crate::dataset::{CurrentSeries, Dataset, DatasetConfig};
use crate::domain::{FeatureFrame, ForecastBand, ModelOutput};
use crate::error::AppError;
use crate::fit::backtest::{self, BacktestOptions};
use crate::io::checkpoint::checkpoint_root;
use crate::models::{Hyperparameters, ModelBackend, SequenceModel};
use crate::prediction::{PredictionSet, PredictionStore, RangeReport};

pub use aggregate::{MemberForecast, QuantileLevels, aggregate, member_forecast};

/// What to do when one member fails during a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort on the first failing member.
    #[default]
    FailFast,
    /// Drop failing members with a warning; fail only if all of them fail.
    SkipAndWarn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    pub parallel: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    /// Checkpoints live under `<parent_dir>/<catchment>/<model_save_dir>`.
    pub parent_dir: PathBuf,
    pub model_save_dir: String,
    /// Build fresh models even when checkpoints exist.
    pub overwrite_models: bool,
    /// Member used for single-timestamp inference.
    pub inference_member: usize,
    pub quantiles: QuantileLevels,
    pub train: TrainOptions,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            parent_dir: PathBuf::from("checkpoints"),
            model_save_dir: "models".to_string(),
            overwrite_models: false,
            inference_member: 0,
            quantiles: QuantileLevels::default(),
            train: TrainOptions::default(),
        }
    }
}

/// How the members came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSource {
    Built,
    Loaded,
}

pub struct Forecaster<B: ModelBackend, C: CatchmentData> {
    catchment: C,
    dataset: Dataset,
    members: Vec<B::Model>,
    source: MemberSource,
    config: ForecasterConfig,
    checkpoint_root: PathBuf,
    prediction_set: PredictionSet,
}

impl<B: ModelBackend, C: CatchmentData> Forecaster<B, C> {
    pub fn new(
        catchment: C,
        backend: &B,
        dataset_config: DatasetConfig,
        params: &Hyperparameters,
        config: ForecasterConfig,
    ) -> Result<Self, AppError> {
        config.quantiles.validate()?;
        let dataset = Dataset::new(&catchment, dataset_config)?;
        let root = checkpoint_root(&config.parent_dir, catchment.name(), &config.model_save_dir);

        let (members, source) = if config.overwrite_models || !root.exists() {
            let members = (0..dataset.num_variants())
                .map(|i| {
                    info!(index = i, "Building model for dataset");
                    backend.build(params, i, &root)
                })
                .collect::<Result<Vec<_>, _>>()?;
            (members, MemberSource::Built)
        } else {
            info!(root = %root.display(), "Loading models from checkpoints");
            let members = (0..dataset.num_variants())
                .map(|i| backend.load(i, &root))
                .collect::<Result<Vec<_>, _>>()?;
            (members, MemberSource::Loaded)
        };

        let Some(inference) = members.get(config.inference_member) else {
            return Err(AppError::Config(format!(
                "inference member {} out of range ({} members)",
                config.inference_member,
                members.len()
            )));
        };
        let prediction_set = PredictionSet::new(
            dataset.current(),
            config.inference_member,
            inference.input_chunk_length(),
        )?;

        Ok(Self {
            catchment,
            dataset,
            members,
            source,
            config,
            checkpoint_root: root,
            prediction_set,
        })
    }

    pub fn catchment(&self) -> &C {
        &self.catchment
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn members(&self) -> &[B::Model] {
        &self.members
    }

    pub fn source(&self) -> MemberSource {
        self.source
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    pub fn checkpoint_root(&self) -> &Path {
        &self.checkpoint_root
    }

    pub fn prediction_set(&self) -> &PredictionSet {
        &self.prediction_set
    }

    /// Train every member on the shared target and its own covariates.
    pub fn fit(&mut self, opts: &TrainOptions) -> Result<(), AppError> {
        let parts = self.dataset.partitions();
        let fit_one = |(i, model): (usize, &mut B::Model)| -> Result<(), AppError> {
            info!(index = i, "Fitting model");
            model.fit(
                &parts.y_train,
                &parts.x_trains[i],
                &parts.y_validation,
                &parts.x_validations[i],
            )
        };
        let results: Vec<Result<(), AppError>> = if opts.parallel {
            self.members.par_iter_mut().enumerate().map(fit_one).collect()
        } else {
            self.members.iter_mut().enumerate().map(fit_one).collect()
        };
        let fitted = settle(results, opts.failure_policy)?;
        info!(fitted = fitted.len(), members = self.members.len(), "Ensemble fitted");
        Ok(())
    }

    /// Backtest every member over the test partition and aggregate.
    pub fn historical_forecasts(&self, opts: &BacktestOptions) -> Result<ForecastBand, AppError> {
        info!("Generating historical forecasts");
        let parts = self.dataset.partitions();
        let outputs = self.fan_out(|i, model| {
            info!(index = i, "Generating historical forecast for model");
            backtest::historical_forecasts(model, &parts.y_test, &parts.x_tests[i], opts)
        })?;
        self.combine(outputs)
    }

    /// Forecast `n` hours past the end of the current data.
    pub fn forecast_for_hours(&self, n: usize, num_samples: usize) -> Result<ForecastBand, AppError> {
        info!(hours = n, num_samples, "Generating future forecasts");
        self.forecast_current(self.dataset.current(), n, num_samples)
    }

    /// Forecast `n` hours past the end of `frames` (raw current-horizon frames).
    pub fn forecast_from_frames(
        &self,
        frames: &[FeatureFrame],
        n: usize,
        num_samples: usize,
    ) -> Result<ForecastBand, AppError> {
        let current = self.dataset.prepare_current(frames)?;
        self.forecast_current(&current, n, num_samples)
    }

    fn forecast_current(&self, current: &CurrentSeries, n: usize, num_samples: usize) -> Result<ForecastBand, AppError> {
        let outputs = self.fan_out(|i, model| {
            info!(index = i, "Generating future forecast for model");
            model.predict(n, &current.y, &current.xs[i], num_samples)
        })?;
        self.combine(outputs)
    }

    /// Single-timestamp level prediction, in physical units.
    ///
    /// Uses the `input_chunk_length` hours strictly before `timestamp`.
    pub fn forecast_for(&self, timestamp: NaiveDateTime) -> Result<f64, AppError> {
        let model = &self.members[self.config.inference_member];
        let window = model.input_chunk_length();
        let start = timestamp - Duration::hours(window as i64);
        let x_in = self.prediction_set.snapshot().x_in_for_window(start, window)?;
        let scaled = model.predict_window(&x_in)?;
        Ok(self.dataset.scalers().inverse_target(scaled))
    }

    /// Forecast every hour in `[start, end)` and record the results.
    ///
    /// Hours whose window is not (yet) covered are skipped and reported.
    pub fn forecast_for_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        store: &mut dyn PredictionStore,
    ) -> Result<RangeReport, AppError> {
        let mut report = RangeReport::default();
        let mut ts = start;
        while ts < end {
            match self.forecast_for(ts) {
                Ok(level) => {
                    store.record(ts, level)?;
                    report.recorded.push((ts, level));
                }
                Err(e) if e.is_recoverable() => {
                    warn!(timestamp = %ts, error = %e, "Skipping forecast");
                    report.skipped.push((ts, e.to_string()));
                }
                Err(e) => return Err(e),
            }
            ts += Duration::hours(1);
        }
        info!(
            recorded = report.recorded.len(),
            skipped = report.skipped.len(),
            "Range forecast finished"
        );
        Ok(report)
    }

    /// Refresh current data from the catchment and rebuild the live frame.
    ///
    /// Call at least hourly when serving single-timestamp forecasts.
    pub fn update_input_data(&mut self) -> Result<(), AppError> {
        self.catchment.update_for_inference()?;
        let frames = self.catchment.all_current_data()?;
        self.dataset.refresh_current(&frames)?;
        self.prediction_set.update(self.dataset.current())
    }

    fn fan_out<F>(&self, run: F) -> Result<Vec<ModelOutput>, AppError>
    where
        F: Fn(usize, &B::Model) -> Result<ModelOutput, AppError> + Sync,
    {
        let opts = &self.config.train;
        let results: Vec<Result<ModelOutput, AppError>> = if opts.parallel {
            self.members.par_iter().enumerate().map(|(i, m)| run(i, m)).collect()
        } else {
            self.members.iter().enumerate().map(|(i, m)| run(i, m)).collect()
        };
        Ok(settle(results, opts.failure_policy)?
            .into_iter()
            .map(|(_, out)| out)
            .collect())
    }

    /// Inverse-scale member outputs and aggregate them.
    fn combine(&self, outputs: Vec<ModelOutput>) -> Result<ForecastBand, AppError> {
        let scalers = self.dataset.scalers();
        let members = outputs
            .iter()
            .map(|out| {
                let physical = out.map_values(|v| scalers.inverse_target(v));
                if physical.is_stochastic() {
                    info!("Forecast identified as stochastic");
                } else {
                    info!("Forecast identified as deterministic");
                }
                member_forecast(&physical, &self.config.quantiles)
            })
            .collect::<Result<Vec<_>, _>>()?;
        aggregate(&members)
    }
}

/// Apply the failure policy to per-member results, keeping member indices.
fn settle<T>(results: Vec<Result<T, AppError>>, policy: FailurePolicy) -> Result<Vec<(usize, T)>, AppError> {
    let total = results.len();
    let mut ok = Vec::with_capacity(total);
    let mut last_err = None;
    for (i, r) in results.into_iter().enumerate() {
        match (r, policy) {
            (Ok(v), _) => ok.push((i, v)),
            (Err(e), FailurePolicy::FailFast) => return Err(e),
            (Err(e), FailurePolicy::SkipAndWarn) => {
                warn!(index = i, error = %e, "Member failed; continuing without it");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) if ok.is_empty() => Err(e),
        _ => Ok(ok),
    }
}
