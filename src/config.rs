//! Application configuration loaded from TOML.
//!
//! Every section is optional; missing keys fall back to defaults, so an empty
//! file (or no file at all) runs the synthetic demo catchment.
//!
//! ```toml
//! [catchment]
//! name = "upper-river"
//! historical = ["data/hist_0.csv", "data/hist_1.csv"]
//! current = ["data/cur_0.csv", "data/cur_1.csv"]
//!
//! [dataset]
//! target_column = "level"
//!
//! [dataset.features]
//! window_hours = 240
//!
//! [model]
//! input_chunk_length = 48
//! output_chunk_length = 24
//!
//! [forecaster]
//! parent_dir = "checkpoints"
//! failure_policy = "skip_and_warn"
//! ```
//!
//! Environment overrides (a `.env` file is honoured):
//!
//! - `RIVERCAST_MODEL_DIR`: checkpoint parent directory
//! - `RIVERCAST_OVERWRITE_MODELS`: `1/true/yes` or `0/false/no`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::SyntheticConfig;
use crate::dataset::DatasetConfig;
use crate::ensemble::ForecasterConfig;
use crate::error::AppError;
use crate::fit::{BacktestOptions, SearchGrid};
use crate::models::Hyperparameters;

pub const ENV_MODEL_DIR: &str = "RIVERCAST_MODEL_DIR";
pub const ENV_OVERWRITE_MODELS: &str = "RIVERCAST_OVERWRITE_MODELS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchmentConfig {
    pub name: String,
    /// One CSV per variant.
    pub historical: Vec<PathBuf>,
    /// One CSV per variant, same order as `historical`.
    pub current: Vec<PathBuf>,
}

impl Default for CatchmentConfig {
    fn default() -> Self {
        Self {
            name: "demo".to_string(),
            historical: Vec::new(),
            current: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catchment: CatchmentConfig,
    pub dataset: DatasetConfig,
    pub model: Hyperparameters,
    pub forecaster: ForecasterConfig,
    pub backtest: BacktestOptions,
    pub search: SearchGrid,
    pub synthetic: SyntheticConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("failed to read config '{}'", path.display()), e))?;
        Self::from_toml_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, AppError> {
        toml::from_str(contents).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), AppError> {
        if let Some(dir) = lookup(ENV_MODEL_DIR).filter(|d| !d.trim().is_empty()) {
            self.forecaster.parent_dir = PathBuf::from(dir.trim());
        }
        if let Some(raw) = lookup(ENV_OVERWRITE_MODELS) {
            self.forecaster.overwrite_models = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                other => {
                    return Err(AppError::Config(format!(
                        "{ENV_OVERWRITE_MODELS} must be a boolean, got '{other}'"
                    )));
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.dataset.validate()?;
        self.model.validate()?;
        self.forecaster.quantiles.validate()?;
        self.backtest.validate()?;
        if self.catchment.name.trim().is_empty() {
            return Err(AppError::Config("catchment name is empty".to_string()));
        }
        if self.catchment.historical.len() != self.catchment.current.len() {
            return Err(AppError::Config(
                "catchment needs one current file per historical file".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether CSV sources are configured.
    pub fn has_csv_catchment(&self) -> bool {
        !self.catchment.historical.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::FailurePolicy;
    use crate::models::Likelihood;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.validate().is_ok());
        assert!(!config.has_csv_catchment());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [catchment]
            name = "upper"
            historical = ["h0.csv"]
            current = ["c0.csv"]

            [dataset.features]
            window_hours = 48

            [model]
            input_chunk_length = 12
            likelihood = "none"

            [forecaster]
            failure_policy = "skip_and_warn"
            "#,
        )
        .unwrap();
        assert_eq!(config.catchment.name, "upper");
        assert_eq!(config.dataset.features.window_hours, 48);
        assert_eq!(config.dataset.features.precipitation_column, "rain_1h");
        assert_eq!(config.model.input_chunk_length, 12);
        assert_eq!(config.model.output_chunk_length, 24);
        assert_eq!(config.model.likelihood, Likelihood::None);
        assert_eq!(config.forecaster.train.failure_policy, FailurePolicy::SkipAndWarn);
        assert!(config.has_csv_catchment());
    }

    #[test]
    fn unknown_policy_is_a_config_error() {
        let err = AppConfig::from_toml_str("[forecaster]\nfailure_policy = \"retry\"\n").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| match k {
                ENV_MODEL_DIR => Some("/tmp/models".to_string()),
                ENV_OVERWRITE_MODELS => Some("Yes".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.forecaster.parent_dir, PathBuf::from("/tmp/models"));
        assert!(config.forecaster.overwrite_models);
    }

    #[test]
    fn bad_overwrite_flag_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == ENV_OVERWRITE_MODELS).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn mismatched_file_lists_fail_validation() {
        let mut config = AppConfig::default();
        config.catchment.historical = vec![PathBuf::from("h0.csv")];
        assert!(config.validate().is_err());
    }
}
