//! CSV read/write for time-indexed frames.
//!
//! Layout: the first column holds the timestamp, every other column is a
//! numeric series. Empty cells are read as missing (`NaN`) so feature
//! engineering can drop the affected rows.
//!
//! Accepted timestamp forms: `2024-05-01 12:00:00`, `2024-05-01T12:00:00`,
//! `2024-05-01T12:00`, or RFC 3339 with an offset (converted to naive UTC).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use csv::StringRecord;

use crate::domain::TimeSeries;
use crate::error::AppError;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Load a frame from CSV.
pub fn read_frame_csv(path: &Path) -> Result<TimeSeries, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("failed to open frame CSV '{}'", path.display()), e))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::InvalidSeries(format!("{}: failed to read headers: {e}", path.display())))?
        .clone();
    if headers.len() < 2 {
        return Err(AppError::InvalidSeries(format!(
            "{}: expected a timestamp column and at least one value column",
            path.display()
        )));
    }
    let columns: Vec<String> = headers
        .iter()
        .skip(1)
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows: Vec<(NaiveDateTime, Vec<f64>)> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: header line plus 1-based numbering
        let line = idx + 2;
        let record = result
            .map_err(|e| AppError::InvalidSeries(format!("{}:{line}: CSV parse error: {e}", path.display())))?;
        rows.push(parse_record(&record, columns.len())
            .map_err(|msg| AppError::InvalidSeries(format!("{}:{line}: {msg}", path.display())))?);
    }

    rows.sort_by_key(|(ts, _)| *ts);
    let (index, values): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    TimeSeries::new(index, columns, values)
}

fn parse_record(record: &StringRecord, width: usize) -> Result<(NaiveDateTime, Vec<f64>), String> {
    if record.len() != width + 1 {
        return Err(format!("expected {} fields, found {}", width + 1, record.len()));
    }
    let ts = parse_timestamp(&record[0])?;
    let values = record
        .iter()
        .skip(1)
        .map(|cell| {
            if cell.is_empty() {
                Ok(f64::NAN)
            } else {
                cell.parse::<f64>().map_err(|_| format!("invalid number '{cell}'"))
            }
        })
        .collect::<Result<Vec<f64>, String>>()?;
    Ok((ts, values))
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .map_err(|_| format!("invalid timestamp '{raw}'"))
}

/// Write a frame to CSV (missing values as empty cells).
pub fn write_frame_csv(path: &Path, series: &TimeSeries) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create frame CSV '{}'", path.display()), e))?;

    let mut header = String::from("timestamp");
    for c in series.columns() {
        header.push(',');
        header.push_str(c);
    }
    writeln!(file, "{header}").map_err(|e| AppError::io("failed to write frame CSV header", e))?;

    for (ts, row) in series.index().iter().zip(series.rows()) {
        let mut line = ts.format("%Y-%m-%d %H:%M:%S").to_string();
        for v in row {
            line.push(',');
            if v.is_finite() {
                line.push_str(&v.to_string());
            }
        }
        writeln!(file, "{line}").map_err(|e| AppError::io("failed to write frame CSV row", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_supported_timestamp_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-01 12:00:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-05-01T07:00:00-05:00"), Ok(expected));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn csv_round_trip_keeps_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.csv");
        std::fs::write(
            &path,
            "timestamp,rain_1h,level\n2024-05-01 01:00:00,0.5,\n2024-05-01 00:00:00,0.0,3.2\n",
        )
        .unwrap();

        let frame = read_frame_csv(&path).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.row(0), &[0.0, 3.2]);
        assert!(frame.row(1)[1].is_nan());

        let out = dir.path().join("out.csv");
        write_frame_csv(&out, &frame).unwrap();
        let again = read_frame_csv(&out).unwrap();
        assert_eq!(again.index(), frame.index());
        assert_eq!(again.row(0), frame.row(0));
    }
}
