//! Plain-text formatting for terminal output.
//!
//! Formatting lives here so the pipeline code stays free of presentation
//! details and output changes stay local.

use crate::domain::ForecastBand;
use crate::fit::SearchOutcome;
use crate::prediction::RangeReport;
use crate::report::BandMetrics;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Band table; with `max_rows`, only the last rows are shown.
pub fn format_band(band: &ForecastBand, max_rows: Option<usize>) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<16} {:>10} {:>10} {:>10}\n", "timestamp", "min", "mean", "max"));
    out.push_str(&format!("{:-<16} {:-<10} {:-<10} {:-<10}\n", "", "", "", ""));

    let skip = max_rows.map(|m| band.len().saturating_sub(m)).unwrap_or(0);
    if skip > 0 {
        out.push_str(&format!("... {skip} earlier rows\n"));
    }
    for row in band.rows().skip(skip) {
        out.push_str(&format!(
            "{:<16} {:>10.3} {:>10.3} {:>10.3}\n",
            row.timestamp.format(TIMESTAMP_FORMAT),
            row.min,
            row.mean,
            row.max
        ));
    }
    out
}

pub fn format_metrics(metrics: &BandMetrics) -> String {
    format!(
        "Backtest: n={} | MAE={:.4} | RMSE={:.4} | coverage={:.1}%\n",
        metrics.n,
        metrics.mae,
        metrics.rmse,
        metrics.coverage * 100.0
    )
}

pub fn format_search(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    out.push_str("Grid search (MAE on held-out tail, scaled units):\n");
    for s in &outcome.scores {
        let chosen = if s == &outcome.best { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} input={:<5} output={:<5} MAE={:.5}\n",
            s.input_chunk_length, s.output_chunk_length, s.mae
        ));
    }
    for ((l, h), reason) in &outcome.skipped {
        out.push_str(&format!("  (skipped input={l} output={h}) {reason}\n"));
    }
    out
}

pub fn format_range_report(report: &RangeReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<16} {:>10}\n", "timestamp", "level"));
    for (ts, level) in &report.recorded {
        out.push_str(&format!("{:<16} {:>10.3}\n", ts.format(TIMESTAMP_FORMAT), level));
    }
    for (ts, reason) in &report.skipped {
        out.push_str(&format!("{:<16} skipped: {reason}\n", ts.format(TIMESTAMP_FORMAT)));
    }
    out
}
