use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use weblens_types::DailyMetrics;

/// How many trailing days are tested against the baseline.
const RECENT_DAYS: usize = 3;
/// Minimum baseline days required before anomaly detection runs.
const MIN_BASELINE_DAYS: usize = 7;

const Z_ANOMALY: f64 = 2.0;
const Z_HIGH: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub metric: &'static str,
    pub timestamp: DateTime<Utc>,
    /// Baseline mean the value was expected near
    pub expected: f64,
    pub actual: f64,
    pub severity: AnomalySeverity,
    pub description: String,
}

/// Scan the trailing days of a daily window for values that sit far outside
/// the baseline distribution. The baseline is the window minus the tested
/// days, so a genuine spike cannot hide by inflating its own deviation.
pub fn detect_anomalies(rows: &[DailyMetrics]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for (metric, extract) in [
        (
            "conversion_rate",
            (|r: &DailyMetrics| r.conversion_rate) as fn(&DailyMetrics) -> Option<f64>,
        ),
        ("bounce_rate", |r| r.bounce_rate),
        ("avg_session_duration", |r| r.avg_session_duration),
    ] {
        detect_for_metric(rows, metric, extract, &mut anomalies);
    }
    anomalies.sort_by_key(|a| a.timestamp);
    anomalies
}

fn detect_for_metric(
    rows: &[DailyMetrics],
    metric: &'static str,
    extract: fn(&DailyMetrics) -> Option<f64>,
    out: &mut Vec<Anomaly>,
) {
    // Rows arrive date-ascending; keep only days where the metric exists.
    let series: Vec<(&DailyMetrics, f64)> = rows
        .iter()
        .filter_map(|row| extract(row).map(|value| (row, value)))
        .collect();

    if series.len() < MIN_BASELINE_DAYS + 1 {
        debug!(metric, days = series.len(), "too little data for anomaly detection");
        return;
    }

    let recent = RECENT_DAYS.min(series.len().saturating_sub(MIN_BASELINE_DAYS));
    let (baseline, tested) = series.split_at(series.len() - recent);

    let mean = baseline.iter().map(|(_, v)| v).sum::<f64>() / baseline.len() as f64;
    let variance = baseline
        .iter()
        .map(|(_, v)| (v - mean).powi(2))
        .sum::<f64>()
        / baseline.len() as f64;
    let std_dev = variance.sqrt().max(1e-9);

    for (row, value) in tested {
        let z = (value - mean) / std_dev;
        if z.abs() > Z_ANOMALY {
            let severity = if z.abs() > Z_HIGH {
                AnomalySeverity::High
            } else {
                AnomalySeverity::Medium
            };
            out.push(Anomaly {
                metric,
                timestamp: row
                    .date
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight exists")
                    .and_utc(),
                expected: mean,
                actual: *value,
                severity,
                description: format!(
                    "{metric} of {value:.2} deviates from the {mean:.2} baseline (z = {z:.1})"
                ),
            });
        }
    }
}
