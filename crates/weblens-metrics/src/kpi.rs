use crate::rollup::DailyAggregate;
use serde::Serialize;

const CONVERSION_TARGET: f64 = 5.0;
const BOUNCE_TARGET: f64 = 40.0;
const SESSION_DURATION_TARGET: f64 = 180.0;
const LOAD_TIME_TARGET: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiStatus {
    Good,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Kpi {
    pub name: &'static str,
    pub value: f64,
    pub target: f64,
    pub status: KpiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
}

/// Map achievement ratio to status: >= 0.9 good, >= 0.7 warning, else
/// critical. For bounce rate and load time lower is better, so the ratio is
/// inverted before the mapping.
fn status_for(ratio: f64) -> KpiStatus {
    if ratio >= 0.9 {
        KpiStatus::Good
    } else if ratio >= 0.7 {
        KpiStatus::Warning
    } else {
        KpiStatus::Critical
    }
}

fn kpi(
    name: &'static str,
    value: f64,
    target: f64,
    inverted: bool,
    previous: Option<f64>,
) -> Kpi {
    let ratio = if inverted {
        if value > 0.0 {
            target / value
        } else {
            // Nothing measured is as good as it gets for a cost metric.
            f64::INFINITY
        }
    } else {
        value / target
    };

    let change_percent = previous.and_then(|prev| {
        (prev != 0.0).then(|| 100.0 * (value - prev) / prev)
    });

    Kpi {
        name,
        value,
        target,
        status: status_for(ratio),
        previous,
        change_percent,
    }
}

/// Build the four standard KPIs from the current and previous period
/// aggregates. KPIs without data in the current period are omitted.
pub fn build_kpis(current: &DailyAggregate, previous: &DailyAggregate) -> Vec<Kpi> {
    let mut kpis = Vec::with_capacity(4);

    if let Some(value) = current.conversion_rate {
        kpis.push(kpi(
            "Conversion Rate",
            value,
            CONVERSION_TARGET,
            false,
            previous.conversion_rate,
        ));
    }
    if let Some(value) = current.bounce_rate {
        kpis.push(kpi(
            "Bounce Rate",
            value,
            BOUNCE_TARGET,
            true,
            previous.bounce_rate,
        ));
    }
    if let Some(value) = current.avg_session_duration {
        kpis.push(kpi(
            "Avg Session Duration",
            value,
            SESSION_DURATION_TARGET,
            false,
            previous.avg_session_duration,
        ));
    }
    if let Some(value) = current.avg_load_time {
        kpis.push(kpi(
            "Avg Load Time",
            value,
            LOAD_TIME_TARGET,
            true,
            previous.avg_load_time,
        ));
    }

    kpis
}
