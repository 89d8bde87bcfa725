//! The catchment data contract.
//!
//! A catchment exposes one raw frame per feature-set variant, for two horizons:
//! the historical corpus used for training and the current horizon used for
//! live inference. Every frame carries the designated target column plus
//! arbitrary covariates, hourly with no gaps. Consumers always receive copies;
//! the catchment stays owned by the caller.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::domain::FeatureFrame;
use crate::error::AppError;
use crate::io::frames::read_frame_csv;

pub trait CatchmentData {
    fn name(&self) -> &str;

    fn all_historical_data(&self) -> Result<Vec<FeatureFrame>, AppError>;

    fn all_current_data(&self) -> Result<Vec<FeatureFrame>, AppError>;

    /// Re-fetch the current horizon. Call at least hourly when forecasting.
    fn update_for_inference(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    /// Current data as it looked at `asof` (rows after it removed).
    ///
    /// Fails with `DataFetch` when some variant has no row at `asof`.
    fn current_data_as_of(&self, asof: NaiveDateTime) -> Result<Vec<FeatureFrame>, AppError> {
        let frames = self.all_current_data()?;
        frames
            .iter()
            .enumerate()
            .map(|(variant, frame)| {
                if frame.position_of(asof).is_none() {
                    return Err(AppError::DataFetch {
                        timestamp: Some(asof),
                        reason: format!("variant {variant} has no data at this time"),
                    });
                }
                Ok(frame.truncate_after(asof))
            })
            .collect()
    }
}

/// Frames loaded from CSV files, one file per variant and horizon.
#[derive(Debug, Clone)]
pub struct CsvCatchment {
    name: String,
    historical_paths: Vec<PathBuf>,
    current_paths: Vec<PathBuf>,
    historical: Vec<FeatureFrame>,
    current: Vec<FeatureFrame>,
}

impl CsvCatchment {
    pub fn load(
        name: impl Into<String>,
        historical_paths: Vec<PathBuf>,
        current_paths: Vec<PathBuf>,
    ) -> Result<Self, AppError> {
        let name = name.into();
        if historical_paths.is_empty() {
            return Err(AppError::Config(format!("catchment '{name}' lists no historical files")));
        }
        if historical_paths.len() != current_paths.len() {
            return Err(AppError::Config(format!(
                "catchment '{name}' has {} historical but {} current files",
                historical_paths.len(),
                current_paths.len()
            )));
        }

        let historical = read_all(&historical_paths)?;
        let current = read_all(&current_paths)?;
        info!(catchment = %name, variants = historical.len(), "Loaded catchment frames");

        Ok(Self {
            name,
            historical_paths,
            current_paths,
            historical,
            current,
        })
    }
}

fn read_all(paths: &[PathBuf]) -> Result<Vec<FeatureFrame>, AppError> {
    paths
        .iter()
        .map(|p| -> Result<FeatureFrame, AppError> {
            let frame = read_frame_csv(p)?;
            debug!(path = %p.display(), rows = frame.len(), "Read frame");
            Ok(frame)
        })
        .collect()
}

impl CatchmentData for CsvCatchment {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_historical_data(&self) -> Result<Vec<FeatureFrame>, AppError> {
        Ok(self.historical.clone())
    }

    fn all_current_data(&self) -> Result<Vec<FeatureFrame>, AppError> {
        Ok(self.current.clone())
    }

    fn update_for_inference(&mut self) -> Result<(), AppError> {
        self.current = read_all(&self.current_paths)?;
        debug!(
            catchment = %self.name,
            historical_files = self.historical_paths.len(),
            "Refreshed current frames"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    const HIST: &str = "timestamp,rain_1h,level\n2024-01-01 00:00:00,0,1\n2024-01-01 01:00:00,1,2\n";
    const CUR: &str = "timestamp,rain_1h,level\n2024-02-01 00:00:00,0,1\n2024-02-01 01:00:00,1,2\n";

    #[test]
    fn loads_and_refreshes_current_files() {
        let dir = tempfile::tempdir().unwrap();
        let h = write(dir.path(), "h0.csv", HIST);
        let c = write(dir.path(), "c0.csv", CUR);

        let mut catchment = CsvCatchment::load("test", vec![h], vec![c.clone()]).unwrap();
        assert_eq!(catchment.all_historical_data().unwrap()[0].len(), 2);

        fs::write(&c, format!("{CUR}2024-02-01 02:00:00,0,3\n")).unwrap();
        assert_eq!(catchment.all_current_data().unwrap()[0].len(), 2);
        catchment.update_for_inference().unwrap();
        assert_eq!(catchment.all_current_data().unwrap()[0].len(), 3);
    }

    #[test]
    fn as_of_missing_timestamp_is_a_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let h = write(dir.path(), "h0.csv", HIST);
        let c = write(dir.path(), "c0.csv", CUR);
        let catchment = CsvCatchment::load("test", vec![h], vec![c]).unwrap();

        let asof = crate::io::frames::parse_timestamp("2024-02-01 00:00:00").unwrap();
        assert_eq!(catchment.current_data_as_of(asof).unwrap()[0].len(), 1);

        let later = crate::io::frames::parse_timestamp("2024-03-01 00:00:00").unwrap();
        let err = catchment.current_data_as_of(later).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn mismatched_file_lists_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let h = write(dir.path(), "h0.csv", HIST);
        let err = CsvCatchment::load("test", vec![h], vec![]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
