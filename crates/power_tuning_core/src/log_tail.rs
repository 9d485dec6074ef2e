//! Extraction of timing figures from the decoded log tail returned by a
//! synchronous invocation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReportDurations {
    pub duration_ms: f64,
    pub billed_duration_ms: f64,
    pub init_duration_ms: Option<f64>,
}

/// Finds the last `REPORT` line and reads its duration fields.
///
/// Returns `None` when no complete report is present, for example when the
/// tail was truncated to the last 4 KB before the report was written.
pub fn parse_report(log_tail: &str) -> Option<ReportDurations> {
    let report = log_tail
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with("REPORT"))?;

    let mut duration_ms = None;
    let mut billed_duration_ms = None;
    let mut init_duration_ms = None;

    for field in report.split('\t') {
        let Some((name, value)) = field.split_once(':') else {
            continue;
        };
        let slot = match name.trim() {
            "Duration" => &mut duration_ms,
            "Billed Duration" => &mut billed_duration_ms,
            "Init Duration" => &mut init_duration_ms,
            _ => continue,
        };
        *slot = parse_millis(value);
    }

    Some(ReportDurations {
        duration_ms: duration_ms?,
        billed_duration_ms: billed_duration_ms?,
        init_duration_ms,
    })
}

fn parse_millis(raw: &str) -> Option<f64> {
    raw.trim()
        .strip_suffix("ms")
        .map(str::trim)
        .and_then(|number| number.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
}
