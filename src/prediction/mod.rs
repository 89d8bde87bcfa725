//! Live inference windows.
//!
//! A [`PredictionSet`] keeps one fully processed live frame: the inference
//! member's scaled covariates followed by the scaled observed level
//! (`level_lag`). Refreshing builds a new immutable [`LiveFrame`] and swaps the
//! shared handle, so a reader holding a snapshot never sees a half-built frame.

pub mod store;

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use nalgebra::DMatrix;
use tracing::debug;

use crate::dataset::CurrentSeries;
use crate::domain::{InputShape, InputWindow, TimeSeries};
use crate::error::AppError;

pub use store::{InMemoryStore, PredictionStore, RangeReport};

/// Name of the observed-level column appended to the live frame.
pub const LEVEL_LAG: &str = "level_lag";

#[derive(Debug, Clone, PartialEq)]
pub struct LiveFrame {
    frame: TimeSeries,
    shape: InputShape,
}

impl LiveFrame {
    pub fn build(current: &CurrentSeries, member: usize, window: usize) -> Result<Self, AppError> {
        let x = current.xs.get(member).ok_or_else(|| {
            AppError::Config(format!(
                "inference member {member} out of range ({} variants)",
                current.xs.len()
            ))
        })?;
        if x.index() != current.y.index() {
            return Err(AppError::MisalignedVariants {
                variant: member,
                detail: "live covariates and level have different indices".to_string(),
            });
        }
        let frame = x.clone().with_column(LEVEL_LAG, current.y.first_column())?;
        let shape = InputShape {
            window,
            features: frame.width(),
        };
        Ok(Self { frame, shape })
    }

    pub fn frame(&self) -> &TimeSeries {
        &self.frame
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    /// Rows `start ..= start + (window_size_hours - 1)h` as a model input.
    pub fn x_in_for_window(&self, start: NaiveDateTime, window_size_hours: usize) -> Result<InputWindow, AppError> {
        if window_size_hours == 0 {
            return Err(AppError::Config("window size must be > 0".to_string()));
        }
        let end = start + Duration::hours(window_size_hours as i64 - 1);
        let missing = |at: NaiveDateTime| AppError::WindowAlignment {
            start,
            window_size_hours,
            missing: at,
        };
        let first = self.frame.position_of(start).ok_or_else(|| missing(start))?;
        let last = self.frame.position_of(end).ok_or_else(|| missing(end))?;

        let rows = last - first + 1;
        if rows != window_size_hours {
            // Rows dropped during engineering leave holes between `start` and `end`.
            let absent = (1..window_size_hours as i64)
                .map(|k| start + Duration::hours(k))
                .find(|at| self.frame.position_of(*at).is_none())
                .unwrap_or(end);
            return Err(missing(absent));
        }
        let cols = self.frame.width();
        if (rows, cols) != (self.shape.window, self.shape.features) {
            return Err(AppError::ShapeMismatch {
                expected: (self.shape.window, self.shape.features),
                got: (rows, cols),
            });
        }
        let values = DMatrix::from_fn(rows, cols, |i, j| self.frame.row(first + i)[j]);
        Ok(InputWindow { start, end, values })
    }
}

/// Refreshable owner of the current [`LiveFrame`].
#[derive(Debug, Clone)]
pub struct PredictionSet {
    member: usize,
    window: usize,
    live: Arc<LiveFrame>,
}

impl PredictionSet {
    pub fn new(current: &CurrentSeries, member: usize, window: usize) -> Result<Self, AppError> {
        let live = Arc::new(LiveFrame::build(current, member, window)?);
        Ok(Self { member, window, live })
    }

    /// Handle to the frame as of the last refresh.
    pub fn snapshot(&self) -> Arc<LiveFrame> {
        Arc::clone(&self.live)
    }

    pub fn input_shape(&self) -> InputShape {
        self.live.shape()
    }

    /// Rebuild from freshly processed current data.
    pub fn update(&mut self, current: &CurrentSeries) -> Result<(), AppError> {
        let live = LiveFrame::build(current, self.member, self.window)?;
        debug!(rows = live.frame().len(), end = ?live.frame().end(), "Live frame refreshed");
        self.live = Arc::new(live);
        Ok(())
    }

    pub fn x_in_for_window(&self, start: NaiveDateTime, window_size_hours: usize) -> Result<InputWindow, AppError> {
        self.snapshot().x_in_for_window(start, window_size_hours)
    }
}
