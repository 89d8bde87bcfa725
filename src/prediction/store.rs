//! Destinations for single-timestamp forecasts.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::AppError;

/// Receives `(timestamp, level)` pairs produced by range forecasting.
pub trait PredictionStore {
    fn record(&mut self, timestamp: NaiveDateTime, level: f64) -> Result<(), AppError>;
}

/// Keeps the latest value per timestamp.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    levels: BTreeMap<NaiveDateTime, f64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, timestamp: NaiveDateTime) -> Option<f64> {
        self.levels.get(&timestamp).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.levels.iter().map(|(t, v)| (*t, *v))
    }
}

impl PredictionStore for InMemoryStore {
    fn record(&mut self, timestamp: NaiveDateTime, level: f64) -> Result<(), AppError> {
        self.levels.insert(timestamp, level);
        Ok(())
    }
}

/// Outcome of forecasting an hourly range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeReport {
    pub recorded: Vec<(NaiveDateTime, f64)>,
    /// Hours that could not be forecast, with the reason.
    pub skipped: Vec<(NaiveDateTime, String)>,
}
