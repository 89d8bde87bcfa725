//! Sequence model boundary.
//!
//! The ensemble only relies on two traits:
//!
//! - [`ModelBackend`]: builds a fresh model for a variant, or loads one from
//!   its checkpoint
//! - [`SequenceModel`]: fit on target + past covariates, forecast forward,
//!   and score a single prepared window
//!
//! All series handed to a model are already scaled.
//!
//! The built-in backend is [`linear::LinearBlockBackend`].

pub mod linear;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{InputWindow, ModelOutput, TimeSeries};
use crate::error::AppError;

pub use linear::{LinearBlockBackend, LinearBlockModel};

/// Output distribution of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    /// Point forecasts only.
    None,
    /// Independent Gaussian noise per horizon step, sampled along each path.
    #[default]
    Gaussian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Rows of history consumed per forecast.
    pub input_chunk_length: usize,
    /// Rows emitted per forward pass.
    pub output_chunk_length: usize,
    pub likelihood: Likelihood,
    pub ridge_min: f64,
    pub ridge_max: f64,
    pub ridge_steps: usize,
    pub seed: u64,
    /// Write a checkpoint after every successful fit.
    pub save_checkpoints: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            input_chunk_length: 48,
            output_chunk_length: 24,
            likelihood: Likelihood::Gaussian,
            ridge_min: 1e-4,
            ridge_max: 10.0,
            ridge_steps: 11,
            seed: 42,
            save_checkpoints: true,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.input_chunk_length == 0 || self.output_chunk_length == 0 {
            return Err(AppError::Config("chunk lengths must be > 0".to_string()));
        }
        if !(self.ridge_min.is_finite() && self.ridge_min > 0.0 && self.ridge_max >= self.ridge_min) {
            return Err(AppError::Config(format!(
                "invalid ridge range [{}, {}]",
                self.ridge_min, self.ridge_max
            )));
        }
        if self.ridge_steps == 0 {
            return Err(AppError::Config("ridge_steps must be > 0".to_string()));
        }
        Ok(())
    }
}

pub trait SequenceModel: Send + Sync {
    /// Variant index this model belongs to.
    fn index(&self) -> usize;

    fn input_chunk_length(&self) -> usize;

    fn output_chunk_length(&self) -> usize;

    /// Fewest target rows `predict` needs before the forecast origin.
    fn min_history(&self) -> usize {
        self.input_chunk_length()
    }

    /// Train on `target`/`covariates`; the validation pair drives model selection.
    fn fit(
        &mut self,
        target: &TimeSeries,
        covariates: &TimeSeries,
        validation_target: &TimeSeries,
        validation_covariates: &TimeSeries,
    ) -> Result<(), AppError>;

    /// Forecast `n` steps past the end of `target`.
    fn predict(
        &self,
        n: usize,
        target: &TimeSeries,
        covariates: &TimeSeries,
        num_samples: usize,
    ) -> Result<ModelOutput, AppError>;

    /// One-step point prediction from a prepared window (scaled units).
    fn predict_window(&self, window: &InputWindow) -> Result<f64, AppError>;

    fn save(&self) -> Result<(), AppError>;
}

pub trait ModelBackend: Send + Sync {
    type Model: SequenceModel;

    /// Fresh, unfitted model for variant `index`, checkpointing under `root`.
    fn build(&self, params: &Hyperparameters, index: usize, root: &Path) -> Result<Self::Model, AppError>;

    /// Load variant `index` from its checkpoint under `root`.
    fn load(&self, index: usize, root: &Path) -> Result<Self::Model, AppError>;
}
