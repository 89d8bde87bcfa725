//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the dataset pipeline, the models and the ensemble
//! - exported to CSV/JSON
//! - compared in tests

use chrono::NaiveDateTime;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::TimeSeries;
use crate::error::AppError;
use crate::math::quantile_sorted;

/// Sampled predictive distribution: one row per timestamp, one value per draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledSeries {
    index: Vec<NaiveDateTime>,
    name: String,
    samples: Vec<Vec<f64>>,
}

impl SampledSeries {
    pub fn new(
        index: Vec<NaiveDateTime>,
        name: impl Into<String>,
        samples: Vec<Vec<f64>>,
    ) -> Result<Self, AppError> {
        if index.len() != samples.len() {
            return Err(AppError::InvalidSeries(format!(
                "{} timestamps but {} sample rows",
                index.len(),
                samples.len()
            )));
        }
        let draws = samples.first().map(Vec::len).unwrap_or(0);
        if samples.iter().any(|s| s.len() != draws || s.is_empty()) {
            return Err(AppError::InvalidSeries(
                "every timestamp needs the same non-zero number of draws".to_string(),
            ));
        }
        if index.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::InvalidSeries(
                "sample index is not strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            index,
            name: name.into(),
            samples,
        })
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.first().map(Vec::len).unwrap_or(0)
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// Per-timestamp quantile of the draws.
    pub fn quantile(&self, q: f64) -> Result<TimeSeries, AppError> {
        let values = self
            .samples
            .iter()
            .map(|draws| {
                let mut sorted = draws.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                quantile_sorted(&sorted, q).unwrap_or(f64::NAN)
            })
            .collect();
        TimeSeries::univariate(self.index.clone(), self.name.clone(), values)
    }

    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            index: self.index.clone(),
            name: self.name.clone(),
            samples: self
                .samples
                .iter()
                .map(|draws| draws.iter().map(|&v| f(v)).collect())
                .collect(),
        }
    }
}

/// What a model returns for a forecast request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A single point trajectory.
    Deterministic(TimeSeries),
    /// A sampled distribution per timestamp.
    Probabilistic(SampledSeries),
}

impl ModelOutput {
    pub fn is_stochastic(&self) -> bool {
        matches!(self, ModelOutput::Probabilistic(_))
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        match self {
            ModelOutput::Deterministic(s) => s.index(),
            ModelOutput::Probabilistic(s) => s.index(),
        }
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    /// Apply `f` to every value (every draw for probabilistic output).
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            ModelOutput::Deterministic(s) => ModelOutput::Deterministic(s.map_values(|_, v| f(v))),
            ModelOutput::Probabilistic(s) => ModelOutput::Probabilistic(s.map_values(f)),
        }
    }
}

/// Configured model input shape for single-timestamp inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    /// Window length in rows (hours).
    pub window: usize,
    /// Feature count per row (covariates followed by the observed level).
    pub features: usize,
}

impl InputShape {
    /// Batch-of-one tensor shape handed to a model.
    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (1, self.window, self.features)
    }
}

/// A model-ready inference window.
#[derive(Debug, Clone, PartialEq)]
pub struct InputWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// `window × features`; the last column is the observed level.
    pub values: DMatrix<f64>,
}

impl InputWindow {
    pub fn shape(&self) -> (usize, usize, usize) {
        (1, self.values.nrows(), self.values.ncols())
    }

    pub fn covariate_width(&self) -> usize {
        self.values.ncols().saturating_sub(1)
    }

    /// Observed level column.
    pub fn level(&self) -> Vec<f64> {
        let j = self.values.ncols() - 1;
        self.values.column(j).iter().copied().collect()
    }
}

/// One row of the aggregated ensemble forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub timestamp: NaiveDateTime,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Aggregated ensemble forecast: `min`/`mean`/`max` on one time index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastBand {
    pub index: Vec<NaiveDateTime>,
    pub min: Vec<f64>,
    pub mean: Vec<f64>,
    pub max: Vec<f64>,
}

impl ForecastBand {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = ForecastRow> + '_ {
        self.index.iter().enumerate().map(|(i, &timestamp)| ForecastRow {
            timestamp,
            min: self.min[i],
            mean: self.mean[i],
            max: self.max[i],
        })
    }

    pub fn get(&self, ts: NaiveDateTime) -> Option<ForecastRow> {
        let i = self.index.binary_search(&ts).ok()?;
        Some(ForecastRow {
            timestamp: ts,
            min: self.min[i],
            mean: self.mean[i],
            max: self.max[i],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn hourly(n: usize) -> Vec<NaiveDateTime> {
        let t0 = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| t0 + Duration::hours(i as i64)).collect()
    }

    #[test]
    fn quantiles_interpolate_between_draws() {
        let draws: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        let s = SampledSeries::new(hourly(1), "level", vec![draws]).unwrap();
        assert!((s.quantile(0.05).unwrap().first_column()[0] - 5.0).abs() < 1e-12);
        assert!((s.quantile(0.5).unwrap().first_column()[0] - 50.0).abs() < 1e-12);
        assert!((s.quantile(0.95).unwrap().first_column()[0] - 95.0).abs() < 1e-12);
    }

    #[test]
    fn sampled_series_requires_equal_draw_counts() {
        let err = SampledSeries::new(hourly(2), "level", vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, AppError::InvalidSeries(_)));
    }

    #[test]
    fn map_values_keeps_variant() {
        let s = SampledSeries::new(hourly(1), "level", vec![vec![1.0, 2.0]]).unwrap();
        let out = ModelOutput::Probabilistic(s).map_values(|v| v * 10.0);
        assert!(out.is_stochastic());
        match out {
            ModelOutput::Probabilistic(s) => assert_eq!(s.samples()[0], vec![10.0, 20.0]),
            ModelOutput::Deterministic(_) => unreachable!(),
        }
    }

    #[test]
    fn band_lookup_by_timestamp() {
        let idx = hourly(2);
        let band = ForecastBand {
            index: idx.clone(),
            min: vec![1.0, 2.0],
            mean: vec![1.5, 2.5],
            max: vec![2.0, 3.0],
        };
        assert_eq!(band.get(idx[1]).unwrap().mean, 2.5);
        assert!(band.get(idx[1] + Duration::hours(1)).is_none());
    }
}
