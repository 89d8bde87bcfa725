//! Reporting utilities: backtest metrics and formatted terminal output.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{ForecastBand, TimeSeries};
use crate::math::{mean_absolute_error, root_mean_squared_error};

/// Accuracy of a forecast band against observed levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandMetrics {
    /// Timestamps present in both the band and the observations.
    pub n: usize,
    /// Error of the `mean` column.
    pub mae: f64,
    pub rmse: f64,
    /// Share of observations inside `[min, max]`.
    pub coverage: f64,
}

/// Score `band` against `actual` (first column) on their shared timestamps.
pub fn evaluate_band(band: &ForecastBand, actual: &TimeSeries) -> Option<BandMetrics> {
    let mut observed = Vec::new();
    let mut predicted = Vec::new();
    let mut inside = 0usize;
    for row in band.rows() {
        let Some(i) = actual.position_of(row.timestamp) else {
            continue;
        };
        let y = actual.row(i)[0];
        if !y.is_finite() {
            continue;
        }
        if row.min <= y && y <= row.max {
            inside += 1;
        }
        observed.push(y);
        predicted.push(row.mean);
    }

    let n = observed.len();
    Some(BandMetrics {
        n,
        mae: mean_absolute_error(&observed, &predicted)?,
        rmse: root_mean_squared_error(&observed, &predicted)?,
        coverage: inside as f64 / n as f64,
    })
}
