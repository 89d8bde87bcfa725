//! Dataset pipeline.
//!
//! Turns a catchment's raw per-variant frames into model-ready series:
//!
//! 1. split each frame into covariates `X` and the target `y`
//! 2. engineer calendar/antecedent features on `X` and drop warm-up rows
//! 3. fit the [`ScalerPair`] on the first historical variant (once)
//! 4. align every variant onto one common index and scale it
//! 5. partition historical series chronologically into train/validation/test
//!
//! The current (inference) horizon goes through steps 1, 2 and 4 with the
//! already-fitted scalers.

pub mod features;
pub mod partition;
pub mod scaler;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::CatchmentData;
use crate::domain::{FeatureFrame, TimeSeries};
use crate::error::AppError;

pub use features::{FeatureConfig, add_engineered_features};
pub use partition::{MIN_PARTITION_ROWS, Split, chronological_split};
pub use scaler::{FittedScaler, MinMaxScaler, ScalerPair};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub target_column: String,
    /// Share of each series held out as the test partition.
    pub test_size: f64,
    /// Share of the remainder held out for validation.
    pub validation_size: f64,
    /// Reject variants whose target differs from the first one.
    pub require_shared_target: bool,
    pub features: FeatureConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_column: "level".to_string(),
            test_size: 0.2,
            validation_size: 0.2,
            require_shared_target: true,
            features: FeatureConfig::default(),
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, v) in [("test_size", self.test_size), ("validation_size", self.validation_size)] {
            if !(v > 0.0 && v < 1.0) {
                return Err(AppError::Config(format!("{name} must be in (0, 1), got {v}")));
            }
        }
        if self.features.window_hours == 0 {
            return Err(AppError::Config("features.window_hours must be > 0".to_string()));
        }
        if self.target_column.trim().is_empty() {
            return Err(AppError::Config("target column name is empty".to_string()));
        }
        Ok(())
    }
}

/// Historical partitions: one covariate split per variant, one shared target split.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions {
    pub x_trains: Vec<TimeSeries>,
    pub x_validations: Vec<TimeSeries>,
    pub x_tests: Vec<TimeSeries>,
    pub y_train: TimeSeries,
    pub y_validation: TimeSeries,
    pub y_test: TimeSeries,
}

/// Scaled current-horizon series.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSeries {
    pub xs: Vec<TimeSeries>,
    pub y: TimeSeries,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    config: DatasetConfig,
    scalers: ScalerPair,
    xs_historical: Vec<TimeSeries>,
    y_historical: TimeSeries,
    partitions: Partitions,
    current: CurrentSeries,
}

impl Dataset {
    pub fn new<C: CatchmentData + ?Sized>(catchment: &C, config: DatasetConfig) -> Result<Self, AppError> {
        info!(catchment = catchment.name(), "Preparing dataset");
        let historical = catchment.all_historical_data()?;
        let current = catchment.all_current_data()?;
        Self::from_frames(&historical, &current, config)
    }

    pub fn from_frames(
        historical: &[FeatureFrame],
        current: &[FeatureFrame],
        config: DatasetConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        if historical.is_empty() {
            return Err(AppError::InvalidSeries("catchment provided no historical frames".to_string()));
        }

        let engineered = engineer_all(historical, &config)?;
        let scalers = ScalerPair::fit(&engineered[0].x, &engineered[0].y)?;
        debug!(
            covariates = scalers.covariates.width(),
            "Fitted scalers on the first historical variant"
        );
        let (xs_historical, y_historical) = scale_variants(engineered, &scalers, &config)?;
        let partitions = partition(&xs_historical, &y_historical, &config)?;
        info!(
            variants = xs_historical.len(),
            rows = y_historical.len(),
            train = partitions.y_train.len(),
            validation = partitions.y_validation.len(),
            test = partitions.y_test.len(),
            "Historical data prepared"
        );

        let current = prepare_with(current, &scalers, &config)?;
        info!(rows = current.y.len(), "Current data prepared");

        Ok(Self {
            config,
            scalers,
            xs_historical,
            y_historical,
            partitions,
            current,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn scalers(&self) -> &ScalerPair {
        &self.scalers
    }

    pub fn num_variants(&self) -> usize {
        self.xs_historical.len()
    }

    pub fn xs_historical(&self) -> &[TimeSeries] {
        &self.xs_historical
    }

    pub fn y_historical(&self) -> &TimeSeries {
        &self.y_historical
    }

    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    pub fn current(&self) -> &CurrentSeries {
        &self.current
    }

    /// Process a set of current frames with the fitted scalers.
    pub fn prepare_current(&self, frames: &[FeatureFrame]) -> Result<CurrentSeries, AppError> {
        let prepared = prepare_with(frames, &self.scalers, &self.config)?;
        if prepared.xs.len() != self.num_variants() {
            return Err(AppError::InvalidSeries(format!(
                "expected {} current variants, got {}",
                self.num_variants(),
                prepared.xs.len()
            )));
        }
        Ok(prepared)
    }

    pub fn refresh_current(&mut self, frames: &[FeatureFrame]) -> Result<(), AppError> {
        self.current = self.prepare_current(frames)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Engineered {
    x: TimeSeries,
    y: TimeSeries,
}

fn engineer(frame: &FeatureFrame, variant: usize, config: &DatasetConfig) -> Result<Engineered, AppError> {
    let (x, y) = frame.split_column(&config.target_column)?;
    let x = add_engineered_features(&x, &config.features)?;
    let y = y.restrict_to(x.index());

    let keep: Vec<bool> = y.rows().iter().map(|r| r[0].is_finite()).collect();
    let x = x.filter_rows(&keep);
    let y = y.filter_rows(&keep);

    if x.is_empty() {
        return Err(AppError::InsufficientHistory {
            variant,
            rows: frame.len(),
            needed: config.features.window_hours + 1,
        });
    }
    debug!(variant, raw = frame.len(), usable = x.len(), "Engineered features");
    Ok(Engineered { x, y })
}

fn engineer_all(frames: &[FeatureFrame], config: &DatasetConfig) -> Result<Vec<Engineered>, AppError> {
    frames
        .iter()
        .enumerate()
        .map(|(variant, frame)| engineer(frame, variant, config))
        .collect()
}

/// Timestamps present in every variant.
fn common_index(engineered: &[Engineered]) -> Vec<NaiveDateTime> {
    let Some(first) = engineered.first() else {
        return Vec::new();
    };
    first
        .x
        .index()
        .iter()
        .copied()
        .filter(|ts| engineered[1..].iter().all(|e| e.x.position_of(*ts).is_some()))
        .collect()
}

fn targets_match(a: &TimeSeries, b: &TimeSeries) -> bool {
    a.index() == b.index()
        && a.rows()
            .iter()
            .zip(b.rows())
            .all(|(u, v)| (u[0] - v[0]).abs() <= 1e-9 * u[0].abs().max(1.0))
}

/// Align variants on a common index, check the shared target, then scale.
fn scale_variants(
    engineered: Vec<Engineered>,
    scalers: &ScalerPair,
    config: &DatasetConfig,
) -> Result<(Vec<TimeSeries>, TimeSeries), AppError> {
    let index = common_index(&engineered);
    if index.is_empty() {
        return Err(AppError::MisalignedVariants {
            variant: engineered.len().saturating_sub(1),
            detail: "variants share no timestamps after feature engineering".to_string(),
        });
    }

    let aligned: Vec<Engineered> = engineered
        .into_iter()
        .enumerate()
        .map(|(variant, e)| {
            if e.x.len() != index.len() {
                debug!(variant, from = e.x.len(), to = index.len(), "Trimmed variant to common index");
            }
            Engineered {
                x: e.x.restrict_to(&index),
                y: e.y.restrict_to(&index),
            }
        })
        .collect();

    for (variant, e) in aligned.iter().enumerate().skip(1) {
        if !targets_match(&aligned[0].y, &e.y) {
            if config.require_shared_target {
                return Err(AppError::TargetMismatch { variant });
            }
            warn!(variant, "Target differs from variant 0; using the last variant's target");
        }
    }

    let xs = aligned
        .iter()
        .map(|e| scalers.covariates.transform(&e.x))
        .collect::<Result<Vec<_>, _>>()?;
    let y = match aligned.last() {
        Some(last) => scalers.target.transform(&last.y)?,
        None => return Err(AppError::InvalidSeries("no variants to scale".to_string())),
    };
    Ok((xs, y))
}

fn partition(xs: &[TimeSeries], y: &TimeSeries, config: &DatasetConfig) -> Result<Partitions, AppError> {
    let split = |series: &TimeSeries, variant: usize| -> Result<Split, AppError> {
        chronological_split(series, config.test_size, config.validation_size).ok_or(
            AppError::InsufficientHistory {
                variant,
                rows: series.len(),
                needed: MIN_PARTITION_ROWS,
            },
        )
    };

    let target = split(y, 0)?;
    let mut parts = Partitions {
        x_trains: Vec::with_capacity(xs.len()),
        x_validations: Vec::with_capacity(xs.len()),
        x_tests: Vec::with_capacity(xs.len()),
        y_train: target.train,
        y_validation: target.validation,
        y_test: target.test,
    };
    for (variant, x) in xs.iter().enumerate() {
        let s = split(x, variant)?;
        if s.test.index() != parts.y_test.index() || s.train.index() != parts.y_train.index() {
            return Err(AppError::MisalignedVariants {
                variant,
                detail: "partition boundaries differ from the target's".to_string(),
            });
        }
        parts.x_trains.push(s.train);
        parts.x_validations.push(s.validation);
        parts.x_tests.push(s.test);
    }
    Ok(parts)
}

fn prepare_with(
    frames: &[FeatureFrame],
    scalers: &ScalerPair,
    config: &DatasetConfig,
) -> Result<CurrentSeries, AppError> {
    if frames.is_empty() {
        return Err(AppError::InvalidSeries("no current frames provided".to_string()));
    }
    let engineered = engineer_all(frames, config)?;
    let (xs, y) = scale_variants(engineered, scalers, config)?;
    Ok(CurrentSeries { xs, y })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn frame(n: usize, offset_hours: i64, rain_scale: f64, level_shift: f64) -> FeatureFrame {
        let t0 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let index = (0..n).map(|i| t0 + Duration::hours(i as i64 + offset_hours)).collect();
        let rows = (0..n)
            .map(|i| {
                let t = i as f64 + offset_hours as f64;
                vec![
                    ((i * 7) % 5) as f64 * rain_scale,
                    ((i * 3) % 4) as f64 * 0.1,
                    5.0 * (t / 10.0).sin(),
                    1.0 + (t / 20.0).sin() + level_shift,
                ]
            })
            .collect();
        TimeSeries::new(
            index,
            vec!["rain_1h".into(), "snow_1h".into(), "temp".into(), "level".into()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn five_hundred_rows_partition_into_expected_sizes() {
        let ds = Dataset::from_frames(&[frame(500, 0, 1.0, 0.0)], &[frame(300, 500, 1.0, 0.0)], DatasetConfig::default())
            .unwrap();
        assert_eq!(ds.y_historical().len(), 260);
        let p = ds.partitions();
        assert_eq!((p.y_train.len(), p.y_validation.len(), p.y_test.len()), (166, 42, 52));
        assert_eq!(p.x_trains[0].len(), 166);
        assert_eq!(ds.current().y.len(), 60);
    }

    #[test]
    fn scalers_are_fitted_on_first_variant_only() {
        let config = DatasetConfig::default();
        let frames = [frame(400, 0, 1.0, 0.0), frame(400, 0, 3.0, 0.0)];
        let ds = Dataset::from_frames(&frames, &frames, config.clone()).unwrap();

        let first = engineer(&frames[0], 0, &config).unwrap();
        assert_eq!(ds.scalers(), &ScalerPair::fit(&first.x, &first.y).unwrap());

        // Second variant has triple the rain, so it exceeds the fitted range.
        let rain = ds.xs_historical()[1].column("rain_1h").unwrap();
        assert!(rain.iter().any(|v| *v > 1.0));
    }

    #[test]
    fn differing_targets_are_rejected_by_default() {
        let frames = [frame(300, 0, 1.0, 0.0), frame(300, 0, 1.0, 0.5)];
        let err = Dataset::from_frames(&frames, &frames, DatasetConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::TargetMismatch { variant: 1 }));
    }

    #[test]
    fn differing_targets_use_last_when_allowed() {
        let config = DatasetConfig {
            require_shared_target: false,
            ..DatasetConfig::default()
        };
        let frames = [frame(300, 0, 1.0, 0.0), frame(300, 0, 1.0, 0.5)];
        let ds = Dataset::from_frames(&frames, &frames, config.clone()).unwrap();

        let last = engineer(&frames[1], 1, &config).unwrap();
        let expected = ds.scalers().target.transform(&last.y).unwrap();
        assert_eq!(ds.y_historical(), &expected);
    }

    #[test]
    fn variants_are_intersected_onto_common_index() {
        let frames = [frame(320, 0, 1.0, 0.0), frame(310, 10, 1.0, 0.0)];
        let ds = Dataset::from_frames(&frames, &frames, DatasetConfig::default()).unwrap();
        // variant 0 keeps rows 240..320, variant 1 keeps hours 250..320
        assert_eq!(ds.y_historical().len(), 70);
        assert_eq!(ds.xs_historical()[0].index(), ds.xs_historical()[1].index());
        assert_eq!(ds.partitions().x_tests[1].index(), ds.partitions().y_test.index());
    }

    #[test]
    fn short_history_is_insufficient() {
        let err = Dataset::from_frames(&[frame(200, 0, 1.0, 0.0)], &[frame(300, 0, 1.0, 0.0)], DatasetConfig::default())
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientHistory { variant: 0, rows: 200, .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn current_data_is_scaled_without_refitting() {
        let ds = Dataset::from_frames(&[frame(400, 0, 1.0, 0.0)], &[frame(300, 400, 1.0, 0.0)], DatasetConfig::default())
            .unwrap();
        let before = ds.scalers().clone();
        let wet = ds.prepare_current(&[frame(300, 400, 4.0, 0.0)]).unwrap();
        assert_eq!(ds.scalers(), &before);
        assert!(wet.xs[0].column("rain_1h").unwrap().iter().any(|v| *v > 1.0));
    }

    #[test]
    fn invalid_fractions_are_config_errors() {
        let config = DatasetConfig {
            test_size: 1.0,
            ..DatasetConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }
}
