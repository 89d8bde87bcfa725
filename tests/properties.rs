//! Property-based tests for partitioning, scaling and aggregation.
//!
//! These tests check invariants that should hold for all valid inputs, using
//! randomly generated series.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use rivercast::dataset::{MinMaxScaler, chronological_split};
use rivercast::domain::TimeSeries;
use rivercast::ensemble::{MemberForecast, aggregate};

fn hourly(n: usize, offset: i64) -> Vec<NaiveDateTime> {
    let t0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    (0..n).map(|i| t0 + Duration::hours(i as i64 + offset)).collect()
}

fn make_ts(values: &[f64]) -> TimeSeries {
    TimeSeries::univariate(hourly(values.len(), 0), "level", values.to_vec()).unwrap()
}

/// Member point forecasts of equal length, each possibly shifted in time.
fn members_strategy() -> impl Strategy<Value = Vec<(i64, Vec<f64>)>> {
    (4usize..20).prop_flat_map(|len| {
        prop::collection::vec(
            (0i64..3, prop::collection::vec(-50.0..50.0_f64, len)),
            1..6,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn partitions_reassemble_the_series(
        values in prop::collection::vec(0.0..10.0_f64, 3..400),
        test_size in 0.05..0.5_f64,
        validation_size in 0.05..0.5_f64,
    ) {
        let series = make_ts(&values);
        if let Some(split) = chronological_split(&series, test_size, validation_size) {
            prop_assert!(!split.train.is_empty());
            prop_assert!(!split.validation.is_empty());
            prop_assert!(!split.test.is_empty());
            let joined = TimeSeries::concat(&[&split.train, &split.validation, &split.test]).unwrap();
            prop_assert_eq!(joined, series);
        }
    }

    #[test]
    fn test_share_tracks_requested_fraction(
        values in prop::collection::vec(0.0..10.0_f64, 50..500),
        test_size in 0.1..0.4_f64,
    ) {
        let series = make_ts(&values);
        let split = chronological_split(&series, test_size, 0.2).unwrap();
        let share = split.test.len() as f64 / series.len() as f64;
        prop_assert!((share - test_size).abs() <= 2.0 / series.len() as f64);
        prop_assert!(split.train.end() < split.validation.start());
        prop_assert!(split.validation.end() < split.test.start());
    }

    #[test]
    fn validation_share_tracks_requested_fraction(
        values in prop::collection::vec(0.0..10.0_f64, 50..500),
        validation_size in 0.1..0.4_f64,
    ) {
        let series = make_ts(&values);
        let split = chronological_split(&series, 0.2, validation_size).unwrap();
        let rest = (split.train.len() + split.validation.len()) as f64;
        let share = split.validation.len() as f64 / rest;
        prop_assert!((share - validation_size).abs() <= 1.0 / rest + 1e-9);
        prop_assert_eq!(split.train.len() + split.validation.len() + split.test.len(), series.len());
    }

    #[test]
    fn scaler_maps_fit_data_into_unit_range_and_back(
        values in prop::collection::vec(-1000.0..1000.0_f64, 2..200),
    ) {
        let series = make_ts(&values);
        let scaler = MinMaxScaler::new().fit(&series).unwrap();
        let scaled = scaler.transform(&series).unwrap();
        for v in scaled.first_column() {
            prop_assert!((-1e-12..=1.0 + 1e-12).contains(&v));
        }
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in restored.first_column().iter().zip(&values) {
            prop_assert!((a - b).abs() < 1e-9 * (1.0 + b.abs()));
        }
    }

    #[test]
    fn band_is_ordered_on_shared_timestamps(members in members_strategy()) {
        let forecasts: Vec<MemberForecast> = members
            .iter()
            .map(|(offset, values)| {
                MemberForecast::Point(
                    TimeSeries::univariate(hourly(values.len(), *offset), "level", values.clone()).unwrap(),
                )
            })
            .collect();
        let band = aggregate(&forecasts).unwrap();

        for row in band.rows() {
            prop_assert!(row.min <= row.mean + 1e-9);
            prop_assert!(row.mean <= row.max + 1e-9);
            for m in &forecasts {
                prop_assert!(m.median().position_of(row.timestamp).is_some());
            }
        }
        let max_offset = members.iter().map(|(o, _)| *o).max().unwrap();
        let min_offset = members.iter().map(|(o, _)| *o).min().unwrap();
        let len = members[0].1.len() as i64;
        prop_assert_eq!(band.len() as i64, len - (max_offset - min_offset));
    }

    #[test]
    fn single_point_member_collapses_the_band(
        values in prop::collection::vec(-50.0..50.0_f64, 1..50),
    ) {
        let band = aggregate(&[MemberForecast::Point(make_ts(&values))]).unwrap();
        prop_assert_eq!(&band.min, &values);
        prop_assert_eq!(&band.mean, &values);
        prop_assert_eq!(&band.max, &values);
    }
}
