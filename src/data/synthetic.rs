//! Seeded synthetic catchment.
//!
//! One shared hourly weather history drives a linear-reservoir water level.
//! Each variant sees the same level but its own noisy copy of the weather, the
//! way neighbouring grid points of a weather model would. Output is fully
//! determined by the config (seed included).

use std::collections::hash_map::DefaultHasher;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::data::catchment::CatchmentData;
use crate::domain::{FeatureFrame, TimeSeries};
use crate::error::AppError;

const RESERVOIR_DECAY: f64 = 0.97;
const LEVEL_BASE: f64 = 1.0;
const LEVEL_GAIN: f64 = 0.15;
const MELT_RATE: f64 = 0.05;
const WET_START_PROB: f64 = 0.02;
const WET_CONTINUE_PROB: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub variants: usize,
    pub historical_hours: usize,
    pub current_hours: usize,
    /// Extra hours revealed one at a time by `update_for_inference`.
    pub lookahead_hours: usize,
    pub seed: u64,
    pub start: NaiveDateTime,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            variants: 3,
            historical_hours: 24 * 120,
            current_hours: 24 * 14,
            lookahead_hours: 72,
            seed: 7,
            start: NaiveDate::from_ymd_opt(2023, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticCatchment {
    name: String,
    frames: Vec<FeatureFrame>,
    historical_hours: usize,
    current_hours: usize,
    cursor: usize,
}

impl SyntheticCatchment {
    pub fn generate(name: impl Into<String>, config: &SyntheticConfig) -> Result<Self, AppError> {
        if config.variants == 0 {
            return Err(AppError::Config("synthetic catchment needs at least one variant".into()));
        }
        if config.historical_hours == 0 || config.current_hours == 0 {
            return Err(AppError::Config(
                "synthetic historical and current horizons must be non-empty".into(),
            ));
        }

        let total = config.historical_hours + config.current_hours + config.lookahead_hours;
        let index: Vec<NaiveDateTime> = (0..total)
            .map(|i| config.start + Duration::hours(i as i64))
            .collect();

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AppError::Config(format!("noise distribution error: {e}")))?;
        let weather = simulate_weather(&index, &mut StdRng::seed_from_u64(config.seed), &normal);
        let level = reservoir_level(&weather);

        let frames = (0..config.variants)
            .map(|v| {
                let mut rng = StdRng::seed_from_u64(variant_seed(config.seed, v));
                let rows = weather
                    .iter()
                    .zip(&level)
                    .map(|(w, &lvl)| {
                        let rain = (w.rain * (1.0 + 0.15 * normal.sample(&mut rng))).max(0.0);
                        let snow = (w.snow * (1.0 + 0.15 * normal.sample(&mut rng))).max(0.0);
                        let temp = w.temp + 0.7 * normal.sample(&mut rng);
                        vec![rain, snow, temp, lvl]
                    })
                    .collect();
                TimeSeries::new(
                    index.clone(),
                    vec!["rain_1h".into(), "snow_1h".into(), "temp".into(), "level".into()],
                    rows,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.into(),
            frames,
            historical_hours: config.historical_hours,
            current_hours: config.current_hours,
            cursor: config.historical_hours + config.current_hours,
        })
    }

    /// Latest timestamp of the current horizon.
    pub fn now(&self) -> Option<NaiveDateTime> {
        self.frames
            .first()
            .and_then(|f| f.index().get(self.cursor.saturating_sub(1)).copied())
    }
}

impl CatchmentData for SyntheticCatchment {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_historical_data(&self) -> Result<Vec<FeatureFrame>, AppError> {
        Ok(self
            .frames
            .iter()
            .map(|f| f.slice(0..self.historical_hours))
            .collect())
    }

    fn all_current_data(&self) -> Result<Vec<FeatureFrame>, AppError> {
        let start = self.cursor.saturating_sub(self.current_hours);
        Ok(self.frames.iter().map(|f| f.slice(start..self.cursor)).collect())
    }

    fn update_for_inference(&mut self) -> Result<(), AppError> {
        let total = self.frames.first().map(TimeSeries::len).unwrap_or(0);
        if self.cursor >= total {
            return Err(AppError::DataFetch {
                timestamp: self.now(),
                reason: "synthetic lookahead exhausted".into(),
            });
        }
        self.cursor += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Weather {
    rain: f64,
    snow: f64,
    temp: f64,
}

fn simulate_weather(index: &[NaiveDateTime], rng: &mut StdRng, normal: &Normal<f64>) -> Vec<Weather> {
    let mut wet = false;
    let mut temp_noise = 0.0;
    index
        .iter()
        .map(|ts| {
            let season = -10.0 * (2.0 * PI * ts.ordinal() as f64 / 365.0).cos();
            let daily = 4.0 * (2.0 * PI * (ts.hour() as f64 - 9.0) / 24.0).sin();
            temp_noise = 0.9 * temp_noise + 0.8 * normal.sample(rng);
            let temp = 6.0 + season + daily + temp_noise;

            let p = if wet { WET_CONTINUE_PROB } else { WET_START_PROB };
            wet = rng.gen_bool(p);
            let precip = if wet {
                (1.0 + 0.8 * normal.sample(rng)).abs()
            } else {
                0.0
            };

            if temp < 0.0 {
                Weather { rain: 0.0, snow: precip, temp }
            } else {
                Weather { rain: precip, snow: 0.0, temp }
            }
        })
        .collect()
}

fn reservoir_level(weather: &[Weather]) -> Vec<f64> {
    let mut storage = 0.0;
    let mut snowpack = 0.0;
    weather
        .iter()
        .map(|w| {
            let melt = if w.temp > 0.0 {
                (MELT_RATE * w.temp).min(snowpack)
            } else {
                0.0
            };
            snowpack += w.snow - melt;
            storage = RESERVOIR_DECAY * storage + w.rain + melt;
            LEVEL_BASE + LEVEL_GAIN * storage
        })
        .collect()
}

fn variant_seed(seed: u64, variant: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    variant.hash(&mut hasher);
    hasher.finish()
}
