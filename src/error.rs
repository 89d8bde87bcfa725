//! Crate-wide error type.
//!
//! Every fallible operation returns `AppError`. The binary maps it to a process
//! exit code via [`AppError::exit_code`]:
//!
//! - `2`: configuration, input or I/O problems
//! - `3`: not enough data to do the requested work
//! - `4`: model or numerical failures

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Feature engineering or splitting left too few rows for a variant.
    #[error("insufficient history for variant {variant}: {rows} usable rows, need at least {needed}")]
    InsufficientHistory {
        variant: usize,
        rows: usize,
        needed: usize,
    },

    /// A checkpoint expected in load mode is missing or unreadable.
    #[error("failed to load model {index} from '{}': {reason}", path.display())]
    ModelLoad {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// The live frame does not cover a requested inference window.
    #[error("window starting {start} ({window_size_hours}h) is not covered by the live frame: {missing} is absent")]
    WindowAlignment {
        start: NaiveDateTime,
        window_size_hours: usize,
        missing: NaiveDateTime,
    },

    /// Upstream data could not be obtained.
    #[error("data unavailable{}: {reason}", timestamp.map(|t| format!(" for {t}")).unwrap_or_default())]
    DataFetch {
        timestamp: Option<NaiveDateTime>,
        reason: String,
    },

    /// A historical variant carries a different target series than variant 0.
    #[error("variant {variant} has a different target series than variant 0")]
    TargetMismatch { variant: usize },

    /// Variants could not be put on one shared time index.
    #[error("variant {variant} does not align with the shared target index: {detail}")]
    MisalignedVariants { variant: usize, detail: String },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("invalid time series: {0}")]
    InvalidSeries(String),

    /// Covariates end before a forecast block's input window does.
    #[error("covariates end at {available_until}, forecast needs them until {needed_until}")]
    CovariateCoverage {
        needed_until: NaiveDateTime,
        available_until: NaiveDateTime,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::InsufficientHistory { .. } => 3,
            AppError::ModelLoad { .. }
            | AppError::Model(_)
            | AppError::CovariateCoverage { .. } => 4,
            AppError::WindowAlignment { .. }
            | AppError::DataFetch { .. }
            | AppError::TargetMismatch { .. }
            | AppError::MisalignedVariants { .. }
            | AppError::ShapeMismatch { .. }
            | AppError::MissingColumn(_)
            | AppError::InvalidSeries(_)
            | AppError::Config(_)
            | AppError::Io { .. } => 2,
        }
    }

    /// Per-item failures that batch operations skip instead of aborting on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::WindowAlignment { .. } | AppError::DataFetch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn exit_codes_follow_error_class() {
        let err = AppError::InsufficientHistory {
            variant: 0,
            rows: 0,
            needed: 3,
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(AppError::Model("singular".into()).exit_code(), 4);
        assert_eq!(AppError::Config("bad".into()).exit_code(), 2);
    }

    #[test]
    fn only_per_item_failures_are_recoverable() {
        let window = AppError::WindowAlignment {
            start: ts(1),
            window_size_hours: 5,
            missing: ts(5),
        };
        let fetch = AppError::DataFetch {
            timestamp: Some(ts(2)),
            reason: "not cached".into(),
        };
        assert!(window.is_recoverable());
        assert!(fetch.is_recoverable());
        assert!(!AppError::TargetMismatch { variant: 1 }.is_recoverable());
    }

    #[test]
    fn data_fetch_message_mentions_timestamp() {
        let err = AppError::DataFetch {
            timestamp: Some(ts(2)),
            reason: "missing".into(),
        };
        assert_eq!(err.to_string(), "data unavailable for 2024-03-01 02:00:00: missing");
    }
}
