//! Grid search over chunk lengths.
//!
//! Every `(input_chunk_length, output_chunk_length)` pair is trained on the
//! head of a training series and scored by forecasting the held-out tail
//! (mean absolute error, scaled units). Combinations that cannot be trained
//! (e.g. the window is longer than the head) are reported as skipped.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::partition::split_fraction;
use crate::domain::{ModelOutput, TimeSeries};
use crate::error::AppError;
use crate::math::{mean_absolute_error, product};
use crate::models::{Hyperparameters, ModelBackend, SequenceModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchGrid {
    pub input_chunk_lengths: Vec<usize>,
    pub output_chunk_lengths: Vec<usize>,
    /// Share of the series used for training each candidate.
    pub train_fraction: f64,
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            input_chunk_lengths: vec![24, 48],
            output_chunk_lengths: vec![12, 24],
            train_fraction: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchScore {
    pub input_chunk_length: usize,
    pub output_chunk_length: usize,
    pub mae: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: SearchScore,
    /// Every combination that trained and scored.
    pub scores: Vec<SearchScore>,
    /// `(input, output)` combinations that failed and why.
    pub skipped: Vec<((usize, usize), String)>,
}

impl SearchOutcome {
    /// `base` with the winning chunk lengths.
    pub fn best_params(&self, base: &Hyperparameters) -> Hyperparameters {
        Hyperparameters {
            input_chunk_length: self.best.input_chunk_length,
            output_chunk_length: self.best.output_chunk_length,
            ..base.clone()
        }
    }
}

fn evaluate<B: ModelBackend>(
    backend: &B,
    params: &Hyperparameters,
    head: &TimeSeries,
    tail: &TimeSeries,
    covariates: &TimeSeries,
) -> Result<f64, AppError> {
    let mut model = backend.build(params, 0, Path::new(""))?;
    let head_x = covariates.restrict_to(head.index());
    let none = head.slice(0..0);
    model.fit(head, &head_x, &none, &head_x.slice(0..0))?;

    let forecast = match model.predict(tail.len(), head, covariates, 1)? {
        ModelOutput::Deterministic(s) => s.first_column(),
        ModelOutput::Probabilistic(s) => s.quantile(0.5)?.first_column(),
    };
    mean_absolute_error(&tail.first_column(), &forecast)
        .ok_or_else(|| AppError::Model("empty evaluation window".to_string()))
}

pub fn grid_search<B: ModelBackend>(
    backend: &B,
    base: &Hyperparameters,
    target: &TimeSeries,
    covariates: &TimeSeries,
    grid: &SearchGrid,
) -> Result<SearchOutcome, AppError> {
    if !(grid.train_fraction > 0.0 && grid.train_fraction < 1.0) {
        return Err(AppError::Config(format!(
            "train_fraction must be in (0, 1), got {}",
            grid.train_fraction
        )));
    }
    let combos = product(&grid.input_chunk_lengths, &grid.output_chunk_lengths);
    if combos.is_empty() {
        return Err(AppError::Config("search grid is empty".to_string()));
    }

    let (head, tail) = split_fraction(target, grid.train_fraction);
    info!(
        combinations = combos.len(),
        train = head.len(),
        holdout = tail.len(),
        "Running grid search"
    );

    let results: Vec<(usize, (usize, usize), Result<f64, AppError>)> = combos
        .par_iter()
        .enumerate()
        .map(|(i, &(l, h))| {
            let params = Hyperparameters {
                input_chunk_length: l,
                output_chunk_length: h,
                save_checkpoints: false,
                ..base.clone()
            };
            (i, (l, h), evaluate(backend, &params, &head, &tail, covariates))
        })
        .collect();

    let mut scores = Vec::new();
    let mut skipped = Vec::new();
    let mut best: Option<(usize, SearchScore)> = None;
    for (i, (l, h), result) in results {
        match result {
            Ok(mae) => {
                debug!(input = l, output = h, mae, "Scored combination");
                let score = SearchScore {
                    input_chunk_length: l,
                    output_chunk_length: h,
                    mae,
                };
                let better = match &best {
                    None => true,
                    Some((bi, b)) => mae.total_cmp(&b.mae).then(i.cmp(bi)).is_lt(),
                };
                if better {
                    best = Some((i, score.clone()));
                }
                scores.push(score);
            }
            Err(e) => {
                debug!(input = l, output = h, error = %e, "Skipped combination");
                skipped.push(((l, h), e.to_string()));
            }
        }
    }

    let Some((_, best)) = best else {
        return Err(AppError::Model(format!(
            "no grid combination could be trained ({} skipped)",
            skipped.len()
        )));
    };
    info!(
        input = best.input_chunk_length,
        output = best.output_chunk_length,
        mae = best.mae,
        "Grid search finished"
    );
    Ok(SearchOutcome { best, scores, skipped })
}
