//! Chronological train / validation / test partitioning.
//!
//! Splits are positional fractions, never shuffled:
//!
//! - `test` is the most recent `test_size` share of the series
//! - `validation` is the most recent `validation_size` share of what remains
//! - `train` is the rest
//!
//! A fractional split point `f` keeps rows `0..=floor((len - 1) * f)` in the
//! head, so 260 rows split at 20/20 give 166 / 42 / 52.

use crate::domain::TimeSeries;

/// Fewest rows that still leave every partition non-empty.
pub const MIN_PARTITION_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: TimeSeries,
    pub validation: TimeSeries,
    pub test: TimeSeries,
}

/// Last head row for a split that keeps `head_fraction` of `len` rows.
pub fn split_point(len: usize, head_fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    (((len - 1) as f64) * head_fraction).floor() as usize
}

/// Split into head/tail at a fractional point.
pub fn split_fraction(series: &TimeSeries, head_fraction: f64) -> (TimeSeries, TimeSeries) {
    series.split_after(split_point(series.len(), head_fraction))
}

/// Nested chronological split; `None` when any partition would be empty.
pub fn chronological_split(series: &TimeSeries, test_size: f64, validation_size: f64) -> Option<Split> {
    if series.len() < MIN_PARTITION_ROWS {
        return None;
    }
    let (rest, test) = split_fraction(series, 1.0 - test_size);
    let (train, validation) = split_fraction(&rest, 1.0 - validation_size);
    if train.is_empty() || validation.is_empty() || test.is_empty() {
        return None;
    }
    Some(Split {
        train,
        validation,
        test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series(n: usize) -> TimeSeries {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let idx = (0..n).map(|i| t0 + Duration::hours(i as i64)).collect();
        TimeSeries::univariate(idx, "level", (0..n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn split_of_260_rows() {
        let s = chronological_split(&series(260), 0.2, 0.2).unwrap();
        assert_eq!(s.test.len(), 52);
        assert_eq!(s.validation.len(), 42);
        assert_eq!(s.train.len(), 166);
    }

    #[test]
    fn partitions_are_chronological_and_contiguous() {
        let full = series(100);
        let s = chronological_split(&full, 0.2, 0.2).unwrap();
        assert!(s.train.end() < s.validation.start());
        assert!(s.validation.end() < s.test.start());
        let joined = TimeSeries::concat(&[&s.train, &s.validation, &s.test]).unwrap();
        assert_eq!(joined, full);
    }

    #[test]
    fn smallest_splittable_series() {
        let s = chronological_split(&series(3), 0.2, 0.2).unwrap();
        assert_eq!((s.train.len(), s.validation.len(), s.test.len()), (1, 1, 1));
        assert!(chronological_split(&series(2), 0.2, 0.2).is_none());
    }
}
