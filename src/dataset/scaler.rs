//! Min-max scaling to `[0, 1]`.
//!
//! Scaling is a two-phase capability: a [`MinMaxScaler`] can only be fitted,
//! and fitting consumes a series and returns a [`FittedScaler`], which can only
//! transform. The pipeline therefore cannot re-fit by accident; the one fit
//! happens where a `ScalerPair` is created.
//!
//! Constant columns get a unit range (`x - min`), which keeps the transform
//! invertible instead of dividing by zero.

use serde::{Deserialize, Serialize};

use crate::domain::TimeSeries;
use crate::error::AppError;

/// Unfitted min-max scaler.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxScaler;

impl MinMaxScaler {
    pub fn new() -> Self {
        Self
    }

    /// Learn per-column minimum and range; non-finite values are ignored.
    pub fn fit(self, series: &TimeSeries) -> Result<FittedScaler, AppError> {
        if series.is_empty() {
            return Err(AppError::InvalidSeries(
                "cannot fit a scaler on an empty series".to_string(),
            ));
        }

        let mut min = Vec::with_capacity(series.width());
        let mut range = Vec::with_capacity(series.width());
        for (j, name) in series.columns().iter().enumerate() {
            let (lo, hi) = series
                .rows()
                .iter()
                .map(|r| r[j])
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if !(lo.is_finite() && hi.is_finite()) {
                return Err(AppError::InvalidSeries(format!(
                    "column '{name}' has no finite values to fit"
                )));
            }
            let span = hi - lo;
            min.push(lo);
            range.push(if span > 0.0 { span } else { 1.0 });
        }

        Ok(FittedScaler {
            columns: series.columns().to_vec(),
            min,
            range,
        })
    }
}

/// Fitted min-max scaler. Columns are matched by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    columns: Vec<String>,
    min: Vec<f64>,
    range: Vec<f64>,
}

impl FittedScaler {
    pub fn width(&self) -> usize {
        self.min.len()
    }

    /// Column names seen at fit time.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data_range(&self) -> &[f64] {
        &self.range
    }

    pub fn transform(&self, series: &TimeSeries) -> Result<TimeSeries, AppError> {
        self.check_width(series)?;
        Ok(series.map_values(|j, v| self.transform_value(j, v)))
    }

    pub fn inverse_transform(&self, series: &TimeSeries) -> Result<TimeSeries, AppError> {
        self.check_width(series)?;
        Ok(series.map_values(|j, v| self.inverse_value(j, v)))
    }

    pub fn transform_value(&self, column: usize, v: f64) -> f64 {
        (v - self.min[column]) / self.range[column]
    }

    pub fn inverse_value(&self, column: usize, v: f64) -> f64 {
        v * self.range[column] + self.min[column]
    }

    fn check_width(&self, series: &TimeSeries) -> Result<(), AppError> {
        if series.width() != self.width() {
            return Err(AppError::ShapeMismatch {
                expected: (series.len(), self.width()),
                got: (series.len(), series.width()),
            });
        }
        Ok(())
    }
}

/// Covariate and target scalers, fitted once on the first historical variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerPair {
    pub covariates: FittedScaler,
    pub target: FittedScaler,
}

impl ScalerPair {
    pub fn fit(covariates: &TimeSeries, target: &TimeSeries) -> Result<Self, AppError> {
        Ok(Self {
            covariates: MinMaxScaler::new().fit(covariates)?,
            target: MinMaxScaler::new().fit(target)?,
        })
    }

    /// Map a scaled target value back to physical units.
    pub fn inverse_target(&self, v: f64) -> f64 {
        self.target.inverse_value(0, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn hourly(n: usize) -> Vec<NaiveDateTime> {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| t0 + Duration::hours(i as i64)).collect()
    }

    fn two_column() -> TimeSeries {
        TimeSeries::new(
            hourly(3),
            vec!["rain_1h".into(), "temp".into()],
            vec![vec![0.0, -5.0], vec![2.0, 5.0], vec![4.0, 15.0]],
        )
        .unwrap()
    }

    #[test]
    fn transform_maps_fit_domain_to_unit_interval() {
        let s = two_column();
        let scaler = MinMaxScaler::new().fit(&s).unwrap();
        let t = scaler.transform(&s).unwrap();
        assert_eq!(t.column_at(0), vec![0.0, 0.5, 1.0]);
        assert_eq!(t.column_at(1), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn out_of_domain_values_exceed_unit_interval() {
        let scaler = MinMaxScaler::new().fit(&two_column()).unwrap();
        assert_eq!(scaler.transform_value(0, 8.0), 2.0);
        assert_eq!(scaler.transform_value(1, -25.0), -1.0);
    }

    #[test]
    fn inverse_round_trips() {
        let s = two_column();
        let scaler = MinMaxScaler::new().fit(&s).unwrap();
        let back = scaler.inverse_transform(&scaler.transform(&s).unwrap()).unwrap();
        for (a, b) in back.rows().iter().zip(s.rows()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn constant_column_uses_unit_range() {
        let s = TimeSeries::univariate(hourly(3), "snow_1h", vec![0.0, 0.0, 0.0]).unwrap();
        let scaler = MinMaxScaler::new().fit(&s).unwrap();
        assert_eq!(scaler.data_range(), &[1.0]);
        assert_eq!(scaler.transform(&s).unwrap().first_column(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let scaler = MinMaxScaler::new().fit(&two_column()).unwrap();
        let one = TimeSeries::univariate(hourly(3), "level", vec![1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            scaler.transform(&one).unwrap_err(),
            AppError::ShapeMismatch { .. }
        ));
    }
}
