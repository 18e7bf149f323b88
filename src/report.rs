//! Human-readable output for harness runs

use crate::error::Result;
use crate::harness::{CompactionReport, RunReport, Sample};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count with a binary unit, e.g. `36.2 MB`
pub fn bytes_description(size: u64) -> String {
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// One progress line for a sample
pub fn sample_line(sample: &Sample) -> String {
    format!(
        "iteration {:>6}: {}",
        sample.iteration,
        bytes_description(sample.file_size_bytes)
    )
}

pub fn compaction_summary(label: &str, report: &CompactionReport) -> String {
    format!(
        "{label}: {} -> {} (reclaimed {}, {:.1}%)",
        bytes_description(report.size_before),
        bytes_description(report.size_after),
        bytes_description(report.reclaimed),
        report.reclaimed_ratio() * 100.0
    )
}

/// Run samples and close sizes as one JSON document
pub fn json_summary(run: &RunReport, close: &CompactionReport) -> Result<String> {
    let summary = serde_json::json!({
        "run": run,
        "close": close,
    });
    Ok(serde_json::to_string_pretty(&summary)?)
}
