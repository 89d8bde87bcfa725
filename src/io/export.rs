//! Export forecast bands to CSV.
//!
//! The files are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;

use crate::domain::ForecastBand;
use crate::error::AppError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create export CSV '{}'", path.display()), e))?;
    Ok(BufWriter::new(file))
}

fn write_err(e: std::io::Error) -> AppError {
    AppError::io("failed to write export CSV", e)
}

/// Write a band as `timestamp,min,mean,max`.
pub fn write_band_csv(path: &Path, band: &ForecastBand) -> Result<(), AppError> {
    let mut out = create(path)?;
    writeln!(out, "timestamp,min,mean,max").map_err(write_err)?;
    for row in band.rows() {
        writeln!(
            out,
            "{},{:.6},{:.6},{:.6}",
            row.timestamp.format(TIMESTAMP_FORMAT),
            row.min,
            row.mean,
            row.max
        )
        .map_err(write_err)?;
    }
    out.flush().map_err(write_err)
}

/// Write one band per forecast origin as `origin,timestamp,min,mean,max`.
pub fn write_simulation_csv(path: &Path, runs: &[(NaiveDateTime, ForecastBand)]) -> Result<(), AppError> {
    let mut out = create(path)?;
    writeln!(out, "origin,timestamp,min,mean,max").map_err(write_err)?;
    for (origin, band) in runs {
        for row in band.rows() {
            writeln!(
                out,
                "{},{},{:.6},{:.6},{:.6}",
                origin.format(TIMESTAMP_FORMAT),
                row.timestamp.format(TIMESTAMP_FORMAT),
                row.min,
                row.mean,
                row.max
            )
            .map_err(write_err)?;
        }
    }
    out.flush().map_err(write_err)
}
