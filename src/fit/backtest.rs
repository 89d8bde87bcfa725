//! Rolling backtests.
//!
//! A fitted model is queried at successive origins over a series without
//! retraining. From every forecast only the last point is kept, so the result
//! is one series of `forecast_horizon`-ahead predictions. Forecasts never run
//! past the end of the series.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::partition::split_point;
use crate::domain::{ModelOutput, SampledSeries, TimeSeries};
use crate::error::AppError;
use crate::models::SequenceModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestOptions {
    /// Fraction of the series before the first forecast origin.
    pub start: f64,
    pub forecast_horizon: usize,
    /// Rows between successive origins.
    pub stride: usize,
    pub num_samples: usize,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            start: 0.5,
            forecast_horizon: 1,
            stride: 1,
            num_samples: 1,
        }
    }
}

impl BacktestOptions {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(0.0..1.0).contains(&self.start) {
            return Err(AppError::Config(format!("backtest start must be in [0, 1), got {}", self.start)));
        }
        if self.forecast_horizon == 0 || self.stride == 0 || self.num_samples == 0 {
            return Err(AppError::Config(
                "backtest horizon, stride and sample count must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

enum LastPoint {
    Point(f64),
    Draws(Vec<f64>),
}

/// Forecast origins (row positions) for a series of `len` rows.
pub fn backtest_origins(len: usize, min_history: usize, opts: &BacktestOptions) -> Vec<usize> {
    let first = split_point(len, opts.start).max(min_history);
    if len < opts.forecast_horizon || first > len - opts.forecast_horizon {
        return Vec::new();
    }
    (first..=len - opts.forecast_horizon).step_by(opts.stride).collect()
}

pub fn historical_forecasts<M: SequenceModel + ?Sized>(
    model: &M,
    series: &TimeSeries,
    covariates: &TimeSeries,
    opts: &BacktestOptions,
) -> Result<ModelOutput, AppError> {
    opts.validate()?;
    let origins = backtest_origins(series.len(), model.min_history(), opts);
    if origins.is_empty() {
        return Err(AppError::InsufficientHistory {
            variant: model.index(),
            rows: series.len(),
            needed: model.min_history() + opts.forecast_horizon,
        });
    }
    debug!(
        index = model.index(),
        origins = origins.len(),
        horizon = opts.forecast_horizon,
        "Backtesting"
    );

    let points: Vec<LastPoint> = origins
        .par_iter()
        .map(|&p| -> Result<LastPoint, AppError> {
            let history = series.slice(0..p);
            let out = model.predict(opts.forecast_horizon, &history, covariates, opts.num_samples)?;
            let last = out.len().checked_sub(1).ok_or_else(|| AppError::Model("empty forecast".to_string()))?;
            Ok(match out {
                ModelOutput::Deterministic(s) => LastPoint::Point(s.row(last)[0]),
                ModelOutput::Probabilistic(s) => LastPoint::Draws(s.samples()[last].clone()),
            })
        })
        .collect::<Result<_, _>>()?;

    let index: Vec<_> = origins
        .iter()
        .map(|&p| series.index()[p + opts.forecast_horizon - 1])
        .collect();
    let name = series.columns().first().cloned().unwrap_or_default();

    match points.first() {
        Some(LastPoint::Draws(_)) => {
            let samples = points
                .into_iter()
                .map(|p| match p {
                    LastPoint::Draws(d) => Ok(d),
                    LastPoint::Point(_) => Err(AppError::Model("mixed stochastic and point forecasts".to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ModelOutput::Probabilistic(SampledSeries::new(index, name, samples)?))
        }
        _ => {
            let values = points
                .into_iter()
                .map(|p| match p {
                    LastPoint::Point(v) => Ok(v),
                    LastPoint::Draws(_) => Err(AppError::Model("mixed stochastic and point forecasts".to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ModelOutput::Deterministic(TimeSeries::univariate(index, name, values)?))
        }
    }
}
