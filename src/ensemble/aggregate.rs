//! Combining member forecasts into one band.
//!
//! Each member contributes either one point series or a low/median/high
//! quantile triple. On the timestamps every member covers:
//!
//! - `min`  = smallest low quantile (or point value)
//! - `mean` = average median (or point value)
//! - `max`  = largest high quantile (or point value)
//!
//! An all-point ensemble therefore yields `min == mean == max` only when the
//! members agree; otherwise the band spans the member disagreement.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{ForecastBand, ModelOutput, TimeSeries};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileLevels {
    pub low: f64,
    pub median: f64,
    pub high: f64,
}

impl Default for QuantileLevels {
    fn default() -> Self {
        Self {
            low: 0.05,
            median: 0.5,
            high: 0.95,
        }
    }
}

impl QuantileLevels {
    pub fn validate(&self) -> Result<(), AppError> {
        let in_unit = |q: f64| (0.0..=1.0).contains(&q);
        if !(in_unit(self.low) && in_unit(self.median) && in_unit(self.high)) {
            return Err(AppError::Config("quantile levels must lie in [0, 1]".to_string()));
        }
        if !(self.low <= self.median && self.median <= self.high) {
            return Err(AppError::Config(format!(
                "quantile levels must be ordered, got {} / {} / {}",
                self.low, self.median, self.high
            )));
        }
        Ok(())
    }
}

/// One member's contribution to the band.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberForecast {
    Point(TimeSeries),
    Quantiles {
        low: TimeSeries,
        median: TimeSeries,
        high: TimeSeries,
    },
}

impl MemberForecast {
    pub fn low(&self) -> &TimeSeries {
        match self {
            MemberForecast::Point(s) => s,
            MemberForecast::Quantiles { low, .. } => low,
        }
    }

    pub fn median(&self) -> &TimeSeries {
        match self {
            MemberForecast::Point(s) => s,
            MemberForecast::Quantiles { median, .. } => median,
        }
    }

    pub fn high(&self) -> &TimeSeries {
        match self {
            MemberForecast::Point(s) => s,
            MemberForecast::Quantiles { high, .. } => high,
        }
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        self.median().index()
    }
}

pub fn member_forecast(output: &ModelOutput, levels: &QuantileLevels) -> Result<MemberForecast, AppError> {
    match output {
        ModelOutput::Deterministic(s) => Ok(MemberForecast::Point(s.clone())),
        ModelOutput::Probabilistic(s) => Ok(MemberForecast::Quantiles {
            low: s.quantile(levels.low)?,
            median: s.quantile(levels.median)?,
            high: s.quantile(levels.high)?,
        }),
    }
}

fn value_at(series: &TimeSeries, ts: NaiveDateTime) -> f64 {
    series
        .position_of(ts)
        .map(|i| series.row(i)[0])
        .unwrap_or(f64::NAN)
}

pub fn aggregate(members: &[MemberForecast]) -> Result<ForecastBand, AppError> {
    let Some(first) = members.first() else {
        return Err(AppError::Model("no member forecasts to aggregate".to_string()));
    };
    let index: Vec<NaiveDateTime> = first
        .index()
        .iter()
        .copied()
        .filter(|ts| {
            members[1..].iter().all(|m| {
                m.low().position_of(*ts).is_some()
                    && m.median().position_of(*ts).is_some()
                    && m.high().position_of(*ts).is_some()
            })
        })
        .collect();

    let n = members.len() as f64;
    let mut band = ForecastBand {
        index: Vec::with_capacity(index.len()),
        min: Vec::with_capacity(index.len()),
        mean: Vec::with_capacity(index.len()),
        max: Vec::with_capacity(index.len()),
    };
    for ts in index {
        let lo = members
            .iter()
            .map(|m| value_at(m.low(), ts))
            .fold(f64::INFINITY, f64::min);
        let mid = members.iter().map(|m| value_at(m.median(), ts)).sum::<f64>() / n;
        let hi = members
            .iter()
            .map(|m| value_at(m.high(), ts))
            .fold(f64::NEG_INFINITY, f64::max);
        band.index.push(ts);
        band.min.push(lo);
        band.mean.push(mid);
        band.max.push(hi);
    }
    Ok(band)
}
