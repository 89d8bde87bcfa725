//! Linear block model: direct multi-output ridge regression.
//!
//! For a forecast origin `t` the design row is
//!
//! ```text
//! [ y(t-L) .. y(t-1),  x(t-L) .. x(t-1),  1 ]
//! ```
//!
//! (`L` = input chunk length, each `x` row holding every covariate) and the
//! outputs are `y(t) .. y(t+H-1)` (`H` = output chunk length). One coefficient
//! column per horizon step is solved jointly from shared normal equations.
//!
//! The ridge penalty is picked from a log-spaced grid by validation MSE.
//! Longer forecasts recurse block by block, feeding predictions back as
//! inputs; each block needs observed covariates for its whole input window.
//!
//! With a Gaussian likelihood the residual standard deviation of each horizon
//! step is kept, and sample paths add independent noise before feeding values
//! back, so uncertainty compounds across blocks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{InputWindow, ModelOutput, SampledSeries, TimeSeries};
use crate::error::AppError;
use crate::io::checkpoint::{read_checkpoint, write_checkpoint};
use crate::math::{NormalEquations, log_space, std_dev};
use crate::models::{Hyperparameters, Likelihood, ModelBackend, SequenceModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedState {
    covariate_width: usize,
    lambda: f64,
    /// One coefficient vector (design width) per horizon step.
    coefficients: Vec<Vec<f64>>,
    /// Residual standard deviation per horizon step.
    sigma: Vec<f64>,
    validation_mse: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearBlockModel {
    index: usize,
    params: Hyperparameters,
    state: Option<FittedState>,
    #[serde(skip)]
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearBlockBackend;

impl ModelBackend for LinearBlockBackend {
    type Model = LinearBlockModel;

    fn build(&self, params: &Hyperparameters, index: usize, root: &Path) -> Result<LinearBlockModel, AppError> {
        params.validate()?;
        info!(index, "Building model");
        Ok(LinearBlockModel {
            index,
            params: params.clone(),
            state: None,
            root: root.to_path_buf(),
        })
    }

    fn load(&self, index: usize, root: &Path) -> Result<LinearBlockModel, AppError> {
        info!(index, root = %root.display(), "Loading model");
        let mut model: LinearBlockModel = read_checkpoint(root, index)?;
        model.root = root.to_path_buf();
        Ok(model)
    }
}

struct Samples {
    x: DMatrix<f64>,
    y: DMatrix<f64>,
}

#[derive(Debug)]
struct Candidate {
    idx: usize,
    lambda: f64,
    coefficients: DMatrix<f64>,
    score: f64,
}

impl LinearBlockModel {
    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Ridge penalty chosen at fit time.
    pub fn lambda(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.lambda)
    }

    pub fn validation_mse(&self) -> Option<f64> {
        self.state.as_ref().and_then(|s| s.validation_mse)
    }

    fn fitted(&self) -> Result<&FittedState, AppError> {
        self.state
            .as_ref()
            .ok_or_else(|| AppError::Model(format!("model {} has not been fitted", self.index)))
    }

    fn design_width(&self, covariate_width: usize) -> usize {
        self.params.input_chunk_length * (covariate_width + 1) + 1
    }

    /// Covariate rows aligned to the target's timestamps.
    fn aligned_covariates(&self, target: &TimeSeries, covariates: &TimeSeries) -> Result<Vec<Vec<f64>>, AppError> {
        let aligned = covariates.restrict_to(target.index());
        if aligned.index() != target.index() {
            return Err(AppError::MisalignedVariants {
                variant: self.index,
                detail: format!(
                    "covariates cover {} of {} target timestamps",
                    aligned.len(),
                    target.len()
                ),
            });
        }
        Ok(aligned.rows().to_vec())
    }

    fn build_samples(
        &self,
        target: &[f64],
        covariates: &[Vec<f64>],
        origins: std::ops::Range<usize>,
    ) -> Option<Samples> {
        let (l, h) = (self.params.input_chunk_length, self.params.output_chunk_length);
        if origins.is_empty() {
            return None;
        }
        let k = covariates.first().map(Vec::len).unwrap_or(0);
        let p = self.design_width(k);
        let n = origins.len();

        let mut x = DMatrix::<f64>::zeros(n, p);
        let mut y = DMatrix::<f64>::zeros(n, h);
        let mut row = vec![0.0; p];
        for (r, t) in origins.enumerate() {
            fill_design_row(&target[t - l..t], &covariates[t - l..t], &mut row);
            for (j, v) in row.iter().enumerate() {
                x[(r, j)] = *v;
            }
            for s in 0..h {
                y[(r, s)] = target[t + s];
            }
        }
        Some(Samples { x, y })
    }
}

fn fill_design_row(targets: &[f64], covariates: &[Vec<f64>], out: &mut [f64]) {
    let l = targets.len();
    out[..l].copy_from_slice(targets);
    let mut j = l;
    for row in covariates {
        out[j..j + row.len()].copy_from_slice(row);
        j += row.len();
    }
    out[j] = 1.0;
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn mean_squared_error(predicted: &DMatrix<f64>, actual: &DMatrix<f64>) -> f64 {
    let n = actual.len();
    if n == 0 {
        return f64::NAN;
    }
    (predicted - actual).iter().map(|e| e * e).sum::<f64>() / n as f64
}

fn origin_seed(seed: u64, index: usize, origin: NaiveDateTime) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    index.hash(&mut hasher);
    origin.hash(&mut hasher);
    hasher.finish()
}

impl SequenceModel for LinearBlockModel {
    fn index(&self) -> usize {
        self.index
    }

    fn input_chunk_length(&self) -> usize {
        self.params.input_chunk_length
    }

    fn output_chunk_length(&self) -> usize {
        self.params.output_chunk_length
    }

    fn fit(
        &mut self,
        target: &TimeSeries,
        covariates: &TimeSeries,
        validation_target: &TimeSeries,
        validation_covariates: &TimeSeries,
    ) -> Result<(), AppError> {
        let (l, h) = (self.params.input_chunk_length, self.params.output_chunk_length);
        let y_train = target.first_column();
        let x_train = self.aligned_covariates(target, covariates)?;
        let n = y_train.len();
        if n < l + h {
            return Err(AppError::InsufficientHistory {
                variant: self.index,
                rows: n,
                needed: l + h,
            });
        }
        let covariate_width = covariates.width();

        let train = self
            .build_samples(&y_train, &x_train, l..n - h + 1)
            .ok_or_else(|| AppError::Model("no training samples".to_string()))?;

        // Validation origins sit inside the validation series, with inputs
        // reaching back into the training tail.
        let validation = if validation_target.is_empty() {
            None
        } else {
            if validation_target.start() <= target.end() {
                return Err(AppError::InvalidSeries(
                    "validation series must follow the training series".to_string(),
                ));
            }
            let mut y_all = y_train.clone();
            y_all.extend(validation_target.first_column());
            let mut x_all = x_train.clone();
            x_all.extend(self.aligned_covariates(validation_target, validation_covariates)?);
            let end = (y_all.len() + 1).saturating_sub(h).max(n);
            self.build_samples(&y_all, &x_all, n..end)
        };
        if validation.is_none() {
            debug!(index = self.index, "Validation series too short; selecting penalty on training fit");
        }

        let normal = NormalEquations::from_design(&train.x, &train.y);
        let grid = log_space(self.params.ridge_min, self.params.ridge_max, self.params.ridge_steps)?;
        let scored: Vec<Candidate> = grid
            .par_iter()
            .enumerate()
            .filter_map(|(idx, &lambda)| {
                let coefficients = normal.solve_ridge(lambda)?;
                let score = match &validation {
                    Some(v) => mean_squared_error(&(&v.x * &coefficients), &v.y),
                    None => mean_squared_error(&(&train.x * &coefficients), &train.y),
                };
                score.is_finite().then_some(Candidate {
                    idx,
                    lambda,
                    coefficients,
                    score,
                })
            })
            .collect();

        let best = scored
            .into_iter()
            .min_by(|a, b| a.score.total_cmp(&b.score).then(a.idx.cmp(&b.idx)))
            .ok_or_else(|| AppError::Model(format!("model {}: no penalty produced a solution", self.index)))?;

        let residual_source = validation.as_ref().filter(|v| v.y.nrows() >= 2).unwrap_or(&train);
        let residuals = &residual_source.x * &best.coefficients - &residual_source.y;
        let sigma = (0..h)
            .map(|s| {
                let col: Vec<f64> = residuals.column(s).iter().copied().collect();
                std_dev(&col).unwrap_or(0.0)
            })
            .collect();
        let coefficients = (0..h)
            .map(|s| best.coefficients.column(s).iter().copied().collect())
            .collect();

        info!(
            index = self.index,
            lambda = best.lambda,
            score = best.score,
            samples = train.x.nrows(),
            "Fitted model"
        );
        self.state = Some(FittedState {
            covariate_width,
            lambda: best.lambda,
            coefficients,
            sigma,
            validation_mse: validation.as_ref().map(|_| best.score),
        });

        if self.params.save_checkpoints {
            self.save()?;
        }
        Ok(())
    }

    fn predict(
        &self,
        n: usize,
        target: &TimeSeries,
        covariates: &TimeSeries,
        num_samples: usize,
    ) -> Result<ModelOutput, AppError> {
        let state = self.fitted()?;
        let (l, h) = (self.params.input_chunk_length, self.params.output_chunk_length);
        if n == 0 {
            return Err(AppError::Model("forecast horizon must be > 0".to_string()));
        }
        if covariates.width() != state.covariate_width {
            return Err(AppError::ShapeMismatch {
                expected: (covariates.len(), state.covariate_width),
                got: (covariates.len(), covariates.width()),
            });
        }
        let history = target.first_column();
        let (Some(end), true) = (target.end(), history.len() >= l) else {
            return Err(AppError::InsufficientHistory {
                variant: self.index,
                rows: history.len(),
                needed: l,
            });
        };

        let freq = target.freq();
        let blocks = n.div_ceil(h);
        let needed_until = end + freq * ((blocks - 1) * h) as i32;
        let available_until = covariates.end().unwrap_or(end);
        let Some(pos) = covariates.position_of(end) else {
            return Err(AppError::CovariateCoverage {
                needed_until,
                available_until,
            });
        };
        if pos + 1 < l {
            return Err(AppError::InsufficientHistory {
                variant: self.index,
                rows: pos + 1,
                needed: l,
            });
        }
        if pos + (blocks - 1) * h >= covariates.len() {
            return Err(AppError::CovariateCoverage {
                needed_until,
                available_until,
            });
        }

        let stochastic = self.params.likelihood == Likelihood::Gaussian && num_samples > 1;
        let draws = if stochastic { num_samples } else { 1 };
        let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::Model(format!("noise distribution error: {e}")))?;
        let mut rng = StdRng::seed_from_u64(origin_seed(self.params.seed, self.index, end));

        let rows = covariates.rows();
        let mut design = vec![0.0; self.design_width(state.covariate_width)];
        let mut paths = Vec::with_capacity(draws);
        for _ in 0..draws {
            let mut window = history[history.len() - l..].to_vec();
            let mut path = Vec::with_capacity(n);
            for b in 0..blocks {
                let origin = pos + 1 + b * h;
                fill_design_row(&window, &rows[origin - l..origin], &mut design);
                for s in 0..h.min(n - path.len()) {
                    let mean = dot(&design, &state.coefficients[s]);
                    let v = if stochastic {
                        mean + state.sigma[s] * normal.sample(&mut rng)
                    } else {
                        mean
                    };
                    path.push(v);
                    window.push(v);
                }
                let excess = window.len() - l;
                window.drain(..excess);
            }
            paths.push(path);
        }

        let index: Vec<NaiveDateTime> = (1..=n).map(|i| end + freq * i as i32).collect();
        let name = target.columns().first().cloned().unwrap_or_default();
        if stochastic {
            let samples = (0..n).map(|i| paths.iter().map(|p| p[i]).collect()).collect();
            Ok(ModelOutput::Probabilistic(SampledSeries::new(index, name, samples)?))
        } else {
            let path = paths.into_iter().next().unwrap_or_default();
            Ok(ModelOutput::Deterministic(TimeSeries::univariate(index, name, path)?))
        }
    }

    fn predict_window(&self, window: &InputWindow) -> Result<f64, AppError> {
        let state = self.fitted()?;
        let l = self.params.input_chunk_length;
        let (_, rows, cols) = window.shape();
        if rows != l || cols != state.covariate_width + 1 {
            return Err(AppError::ShapeMismatch {
                expected: (l, state.covariate_width + 1),
                got: (rows, cols),
            });
        }
        let level = window.level();
        let covariates: Vec<Vec<f64>> = (0..rows)
            .map(|i| (0..state.covariate_width).map(|j| window.values[(i, j)]).collect())
            .collect();
        let mut design = vec![0.0; self.design_width(state.covariate_width)];
        fill_design_row(&level, &covariates, &mut design);
        Ok(dot(&design, &state.coefficients[0]))
    }

    fn save(&self) -> Result<(), AppError> {
        let path = write_checkpoint(&self.root, self.index, self)?;
        debug!(index = self.index, path = %path.display(), "Saved checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    /// Target driven linearly by the previous hour's covariates.
    fn data(n: usize) -> (TimeSeries, TimeSeries) {
        let index: Vec<NaiveDateTime> = (0..n).map(|i| t0() + Duration::hours(i as i64)).collect();
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let t = i as f64;
                vec![(t / 5.0).sin(), (t / 7.0).cos()]
            })
            .collect();
        let y: Vec<f64> = (0..n)
            .map(|i| if i == 0 { 0.3 } else { 0.3 + 0.5 * x[i - 1][0] + 0.2 * x[i - 1][1] })
            .collect();
        (
            TimeSeries::univariate(index.clone(), "level", y).unwrap(),
            TimeSeries::new(index, vec!["a".into(), "b".into()], x).unwrap(),
        )
    }

    fn params(likelihood: Likelihood) -> Hyperparameters {
        Hyperparameters {
            input_chunk_length: 4,
            output_chunk_length: 3,
            likelihood,
            ridge_min: 1e-6,
            ridge_max: 1.0,
            ridge_steps: 7,
            seed: 1,
            save_checkpoints: false,
        }
    }

    fn fitted(likelihood: Likelihood, root: &Path) -> (LinearBlockModel, TimeSeries, TimeSeries) {
        let (y, x) = data(260);
        let mut model = LinearBlockBackend.build(&params(likelihood), 0, root).unwrap();
        model
            .fit(&y.slice(0..150), &x.slice(0..150), &y.slice(150..200), &x.slice(150..200))
            .unwrap();
        (model, y, x)
    }

    #[test]
    fn learns_a_linear_lagged_relationship() {
        let (model, y, x) = fitted(Likelihood::None, Path::new(""));
        let out = model.predict(3, &y.slice(0..220), &x, 1).unwrap();
        let ModelOutput::Deterministic(pred) = out else {
            panic!("expected a deterministic forecast");
        };
        assert_eq!(pred.index(), &y.index()[220..223]);
        for (p, a) in pred.first_column().iter().zip(&y.first_column()[220..223]) {
            assert!((p - a).abs() < 0.05, "{p} vs {a}");
        }
        assert!(model.lambda().is_some());
        assert!(model.validation_mse().is_some());
    }

    #[test]
    fn forecast_index_stays_hourly_after_an_early_gap() {
        let (model, y, x) = fitted(Likelihood::None, Path::new(""));
        let keep: Vec<bool> = (0..260).map(|i| i != 1).collect();
        let (y, x) = (y.filter_rows(&keep), x.filter_rows(&keep));
        let ModelOutput::Deterministic(pred) = model.predict(3, &y.slice(0..219), &x, 1).unwrap() else {
            panic!("expected a deterministic forecast");
        };
        assert_eq!(pred.index(), &y.index()[219..222]);
    }

    #[test]
    fn gaussian_sampling_is_seeded_by_origin() {
        let (model, y, x) = fitted(Likelihood::Gaussian, Path::new(""));
        let a = model.predict(5, &y.slice(0..220), &x, 20).unwrap();
        let b = model.predict(5, &y.slice(0..220), &x, 20).unwrap();
        assert!(a.is_stochastic());
        assert_eq!(a, b);
        let ModelOutput::Probabilistic(s) = a else {
            panic!("expected samples");
        };
        assert_eq!(s.num_samples(), 20);
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn single_sample_is_deterministic() {
        let (model, y, x) = fitted(Likelihood::Gaussian, Path::new(""));
        assert!(!model.predict(2, &y.slice(0..220), &x, 1).unwrap().is_stochastic());
    }

    #[test]
    fn recursion_needs_covariates_for_every_block() {
        let (model, y, x) = fitted(Likelihood::None, Path::new(""));
        // Covariates end at the forecast origin: only one block is possible.
        let err = model.predict(4, &y.slice(0..220), &x.slice(0..220), 1).unwrap_err();
        assert!(matches!(err, AppError::CovariateCoverage { .. }));
        assert!(model.predict(3, &y.slice(0..220), &x.slice(0..220), 1).is_ok());
    }

    #[test]
    fn window_prediction_matches_first_step() {
        let (model, y, x) = fitted(Likelihood::None, Path::new(""));
        let history = y.slice(0..220);
        let ModelOutput::Deterministic(pred) = model.predict(1, &history, &x, 1).unwrap() else {
            panic!("expected a deterministic forecast");
        };

        let values = DMatrix::from_fn(4, 3, |i, j| {
            let r = 216 + i;
            if j < 2 { x.row(r)[j] } else { y.row(r)[0] }
        });
        let window = InputWindow {
            start: y.index()[216],
            end: y.index()[219],
            values,
        };
        let single = model.predict_window(&window).unwrap();
        assert!((single - pred.first_column()[0]).abs() < 1e-12);
    }

    #[test]
    fn wrong_window_shape_is_rejected() {
        let (model, y, _) = fitted(Likelihood::None, Path::new(""));
        let window = InputWindow {
            start: y.index()[0],
            end: y.index()[4],
            values: DMatrix::zeros(5, 3),
        };
        assert!(matches!(
            model.predict_window(&window),
            Err(AppError::ShapeMismatch { expected: (4, 3), got: (5, 3) })
        ));
    }

    #[test]
    fn unfitted_model_refuses_to_predict() {
        let (y, x) = data(50);
        let model = LinearBlockBackend.build(&params(Likelihood::None), 3, Path::new("")).unwrap();
        assert!(matches!(model.predict(1, &y, &x, 1), Err(AppError::Model(_))));
    }

    #[test]
    fn short_training_series_is_insufficient() {
        let (y, x) = data(6);
        let mut model = LinearBlockBackend.build(&params(Likelihood::None), 0, Path::new("")).unwrap();
        let err = model.fit(&y, &x, &y.slice(0..0), &x.slice(0..0)).unwrap_err();
        assert!(matches!(err, AppError::InsufficientHistory { needed: 7, .. }));
    }

    #[test]
    fn checkpoint_round_trip_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let (model, y, x) = fitted(Likelihood::None, dir.path());
        model.save().unwrap();

        let loaded = LinearBlockBackend.load(0, dir.path()).unwrap();
        assert!(loaded.is_fitted());
        assert_eq!(
            loaded.predict(3, &y.slice(0..220), &x, 1).unwrap(),
            model.predict(3, &y.slice(0..220), &x, 1).unwrap()
        );
    }
}
