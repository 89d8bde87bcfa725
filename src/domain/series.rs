//! Time-indexed tables of `f64` columns.
//!
//! `TimeSeries` is the single container used for raw catchment frames,
//! engineered covariates, scaled targets and model outputs. The invariants are
//! enforced on construction:
//!
//! - the index is strictly increasing (unique timestamps, chronological order)
//! - every row has exactly one value per column
//!
//! Values are stored row-major because almost every consumer (feature
//! engineering, windowing, design-matrix assembly) walks the table row by row.

use std::ops::Range;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Raw per-variant frame: covariates plus the target column.
pub type FeatureFrame = TimeSeries;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl TimeSeries {
    pub fn new(
        index: Vec<NaiveDateTime>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, AppError> {
        if index.len() != values.len() {
            return Err(AppError::InvalidSeries(format!(
                "index has {} timestamps but {} rows were given",
                index.len(),
                values.len()
            )));
        }
        if let Some((i, row)) = values.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(AppError::InvalidSeries(format!(
                "row {i} has {} values, expected {}",
                row.len(),
                columns.len()
            )));
        }
        if let Some(w) = index.windows(2).find(|w| w[1] <= w[0]) {
            return Err(AppError::InvalidSeries(format!(
                "index is not strictly increasing at {}",
                w[1]
            )));
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Single-column series.
    pub fn univariate(
        index: Vec<NaiveDateTime>,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, AppError> {
        let rows = values.into_iter().map(|v| vec![v]).collect();
        Self::new(index, vec![name.into()], rows)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i]
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.index.first().copied()
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.index.last().copied()
    }

    /// Sampling interval: the smallest step in the index (hourly if unknown).
    ///
    /// Dropped rows widen individual steps, so the first pair is not enough.
    pub fn freq(&self) -> Duration {
        self.index
            .windows(2)
            .map(|w| w[1] - w[0])
            .min()
            .unwrap_or_else(|| Duration::hours(1))
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<Vec<f64>, AppError> {
        let j = self
            .column_position(name)
            .ok_or_else(|| AppError::MissingColumn(name.to_string()))?;
        Ok(self.column_at(j))
    }

    pub fn column_at(&self, j: usize) -> Vec<f64> {
        self.values.iter().map(|r| r[j]).collect()
    }

    /// Values of the first column (the whole series for univariate data).
    pub fn first_column(&self) -> Vec<f64> {
        if self.columns.is_empty() {
            return Vec::new();
        }
        self.column_at(0)
    }

    pub fn position_of(&self, ts: NaiveDateTime) -> Option<usize> {
        self.index.binary_search(&ts).ok()
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            index: self.index[range.clone()].to_vec(),
            columns: self.columns.clone(),
            values: self.values[range].to_vec(),
        }
    }

    /// Split so that the head holds rows `0..=point`.
    pub fn split_after(&self, point: usize) -> (Self, Self) {
        let cut = (point + 1).min(self.len());
        (self.slice(0..cut), self.slice(cut..self.len()))
    }

    /// Split off one column; returns `(rest, column)`.
    pub fn split_column(&self, name: &str) -> Result<(Self, Self), AppError> {
        let j = self
            .column_position(name)
            .ok_or_else(|| AppError::MissingColumn(name.to_string()))?;

        let rest_columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != j)
            .map(|(_, c)| c.clone())
            .collect();
        let rest_values: Vec<Vec<f64>> = self
            .values
            .iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .filter(|(k, _)| *k != j)
                    .map(|(_, v)| *v)
                    .collect()
            })
            .collect();

        let rest = Self {
            index: self.index.clone(),
            columns: rest_columns,
            values: rest_values,
        };
        let column = Self {
            index: self.index.clone(),
            columns: vec![name.to_string()],
            values: self.values.iter().map(|r| vec![r[j]]).collect(),
        };
        Ok((rest, column))
    }

    /// Append a column computed elsewhere (must have one value per row).
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, AppError> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(AppError::InvalidSeries(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.len()
            )));
        }
        if self.column_position(&name).is_some() {
            return Err(AppError::InvalidSeries(format!("duplicate column '{name}'")));
        }
        for (row, v) in self.values.iter_mut().zip(values) {
            row.push(v);
        }
        self.columns.push(name);
        Ok(self)
    }

    /// Keep rows where `keep[i]` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let mut index = Vec::new();
        let mut values = Vec::new();
        for (i, &k) in keep.iter().enumerate().take(self.len()) {
            if k {
                index.push(self.index[i]);
                values.push(self.values[i].clone());
            }
        }
        Self {
            index,
            columns: self.columns.clone(),
            values,
        }
    }

    /// Keep only rows whose timestamp appears in `index` (which must be sorted).
    pub fn restrict_to(&self, index: &[NaiveDateTime]) -> Self {
        let keep: Vec<bool> = self
            .index
            .iter()
            .map(|ts| index.binary_search(ts).is_ok())
            .collect();
        self.filter_rows(&keep)
    }

    /// Keep rows with timestamps `<= until`.
    pub fn truncate_after(&self, until: NaiveDateTime) -> Self {
        let cut = self.index.partition_point(|ts| *ts <= until);
        self.slice(0..cut)
    }

    /// Apply `f(column, value)` to every cell.
    pub fn map_values(&self, f: impl Fn(usize, f64) -> f64) -> Self {
        let values = self
            .values
            .iter()
            .map(|r| r.iter().enumerate().map(|(j, &v)| f(j, v)).collect())
            .collect();
        Self {
            index: self.index.clone(),
            columns: self.columns.clone(),
            values,
        }
    }

    /// Row-wise concatenation; parts must share columns and follow each other in time.
    pub fn concat(parts: &[&TimeSeries]) -> Result<Self, AppError> {
        let Some(first) = parts.first() else {
            return Err(AppError::InvalidSeries("nothing to concatenate".to_string()));
        };
        let mut index = Vec::new();
        let mut values = Vec::new();
        for part in parts {
            if part.columns != first.columns {
                return Err(AppError::InvalidSeries(
                    "cannot concatenate series with different columns".to_string(),
                ));
            }
            index.extend_from_slice(&part.index);
            values.extend(part.values.iter().cloned());
        }
        Self::new(index, first.columns.clone(), values)
    }
}
