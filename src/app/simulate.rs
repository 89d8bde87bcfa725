//! Past-inference simulation.
//!
//! Re-runs forward forecasts as they would have been issued at earlier
//! origins: for each origin the catchment is asked for current data as it
//! looked then. Origins whose data cannot be fetched are skipped and listed.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::data::CatchmentData;
use crate::domain::ForecastBand;
use crate::ensemble::Forecaster;
use crate::error::AppError;
use crate::models::ModelBackend;

#[derive(Debug, Clone, Default)]
pub struct SimulationRun {
    pub bands: Vec<(NaiveDateTime, ForecastBand)>,
    pub skipped: Vec<(NaiveDateTime, String)>,
}

pub fn simulate_past_inference<B: ModelBackend, C: CatchmentData>(
    forecaster: &Forecaster<B, C>,
    origins: &[NaiveDateTime],
    hours: usize,
    num_samples: usize,
) -> Result<SimulationRun, AppError> {
    let mut run = SimulationRun::default();
    for &origin in origins {
        let result = forecaster
            .catchment()
            .current_data_as_of(origin)
            .and_then(|frames| forecaster.forecast_from_frames(&frames, hours, num_samples));
        match result {
            Ok(band) => run.bands.push((origin, band)),
            Err(e) if e.is_recoverable() => {
                warn!(origin = %origin, error = %e, "Skipping forecast origin");
                run.skipped.push((origin, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        simulated = run.bands.len(),
        skipped = run.skipped.len(),
        "Past inference simulation finished"
    );
    Ok(run)
}
