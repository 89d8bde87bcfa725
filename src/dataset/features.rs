//! Calendar and antecedent-weather features.
//!
//! Every covariate frame gets four extra columns:
//!
//! - `day_of_year`: ordinal day of the row's timestamp
//! - `rain_10d` / `snow_10d`: precipitation and snowfall totals over the
//!   preceding window
//! - `temp_10d`: mean temperature over the preceding window
//!
//! Windows are counted in rows and assume contiguous hourly sampling
//! (10 days = 240 rows). Row `i` aggregates rows `i - window .. i`, so the first
//! `window` rows have no complete history and are dropped, as is any row with a
//! non-finite value.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::domain::TimeSeries;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub precipitation_column: String,
    pub snowfall_column: String,
    pub temperature_column: String,
    /// Accumulation window in rows (hours).
    pub window_hours: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            precipitation_column: "rain_1h".to_string(),
            snowfall_column: "snow_1h".to_string(),
            temperature_column: "temp".to_string(),
            window_hours: 240,
        }
    }
}

impl FeatureConfig {
    fn suffix(&self) -> String {
        if self.window_hours % 24 == 0 {
            format!("{}d", self.window_hours / 24)
        } else {
            format!("{}h", self.window_hours)
        }
    }

    /// Names of the columns appended by [`add_engineered_features`], in order.
    pub fn engineered_columns(&self) -> [String; 4] {
        let suffix = self.suffix();
        [
            "day_of_year".to_string(),
            format!("snow_{suffix}"),
            format!("rain_{suffix}"),
            format!("temp_{suffix}"),
        ]
    }
}

/// Append engineered columns and drop warm-up / incomplete rows.
pub fn add_engineered_features(x: &TimeSeries, config: &FeatureConfig) -> Result<TimeSeries, AppError> {
    if config.window_hours == 0 {
        return Err(AppError::Config("feature window must be at least one hour".to_string()));
    }
    let window = config.window_hours;

    let snow = x.column(&config.snowfall_column)?;
    let rain = x.column(&config.precipitation_column)?;
    let temp = x.column(&config.temperature_column)?;
    let day_of_year: Vec<f64> = x.index().iter().map(|ts| ts.ordinal() as f64).collect();

    let [doy_name, snow_name, rain_name, temp_name] = config.engineered_columns();
    let out = x
        .clone()
        .with_column(doy_name, day_of_year)?
        .with_column(snow_name, trailing_sum(&snow, window))?
        .with_column(rain_name, trailing_sum(&rain, window))?
        .with_column(temp_name, trailing_mean(&temp, window))?;

    let keep: Vec<bool> = out
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| i >= window && row.iter().all(|v| v.is_finite()))
        .collect();

    Ok(out.filter_rows(&keep))
}

/// Sum of the `window` values preceding each position; NaN without full history.
pub fn trailing_sum(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut non_finite = 0usize;
    for i in 0..values.len() {
        if i >= window {
            out[i] = if non_finite == 0 { sum } else { f64::NAN };
            let leaving = values[i - window];
            if leaving.is_finite() {
                sum -= leaving;
            } else {
                non_finite -= 1;
            }
        }
        let v = values[i];
        if v.is_finite() {
            sum += v;
        } else {
            non_finite += 1;
        }
    }
    out
}

/// Mean of the `window` values preceding each position; NaN without full history.
pub fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    trailing_sum(values, window)
        .into_iter()
        .map(|s| s / window as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn hourly(n: usize) -> Vec<NaiveDateTime> {
        let t0 = NaiveDate::from_ymd_opt(2023, 12, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| t0 + Duration::hours(i as i64)).collect()
    }

    fn weather(n: usize) -> TimeSeries {
        let rows = (0..n)
            .map(|i| vec![(i % 3) as f64, 0.0, 10.0 + (i % 5) as f64])
            .collect();
        TimeSeries::new(
            hourly(n),
            vec!["rain_1h".into(), "snow_1h".into(), "temp".into()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn trailing_sum_excludes_current_row() {
        let s = trailing_sum(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(s[0].is_nan() && s[1].is_nan());
        assert_eq!(s[2], 3.0);
        assert_eq!(s[3], 5.0);
    }

    #[test]
    fn trailing_sum_propagates_gaps_only_inside_window() {
        let s = trailing_sum(&[1.0, f64::NAN, 1.0, 1.0, 1.0], 2);
        assert!(s[2].is_nan());
        assert!(s[3].is_nan());
        assert_eq!(s[4], 2.0);
    }

    #[test]
    fn five_hundred_rows_with_ten_day_window_leave_260() {
        let out = add_engineered_features(&weather(500), &FeatureConfig::default()).unwrap();
        assert_eq!(out.len(), 260);
        assert_eq!(out.start(), Some(hourly(500)[240]));
        assert_eq!(
            out.columns(),
            &["rain_1h", "snow_1h", "temp", "day_of_year", "snow_10d", "rain_10d", "temp_10d"]
        );
    }

    #[test]
    fn engineering_is_deterministic() {
        let cfg = FeatureConfig::default();
        let a = add_engineered_features(&weather(300), &cfg).unwrap();
        let b = add_engineered_features(&weather(300), &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn day_of_year_wraps_at_new_year() {
        let cfg = FeatureConfig {
            window_hours: 24,
            ..FeatureConfig::default()
        };
        let out = add_engineered_features(&weather(72), &cfg).unwrap();
        let doy = out.column("day_of_year").unwrap();
        assert_eq!(doy.first(), Some(&365.0));
        assert_eq!(doy.last(), Some(&1.0));
        assert!(out.column("rain_1d").is_ok());
    }

    #[test]
    fn short_frame_yields_no_rows() {
        let out = add_engineered_features(&weather(100), &FeatureConfig::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn missing_weather_column_is_an_error() {
        let x = TimeSeries::univariate(hourly(10), "temp", vec![1.0; 10]).unwrap();
        let err = add_engineered_features(&x, &FeatureConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::MissingColumn(_)));
    }
}
