//! Metrics aggregation engine.
//!
//! Serves time-bucketed metrics per workspace: daily queries read the
//! precomputed rollup rows (computing missing days on the fly from raw
//! data), hourly queries are always computed from raw data, weekly and
//! monthly queries group the daily rows. On top of the series the engine
//! derives KPI statuses against fixed targets and flags statistical
//! anomalies in the recent days.

mod anomaly;
mod engine;
mod kpi;
mod realtime;
mod rollup;

pub use anomaly::{Anomaly, AnomalySeverity};
pub use engine::{
    DataPoint, Granularity, MetricSeries, MetricsEngine, MetricsError, MetricsQuery,
    MetricsReport, Trend,
};
pub use kpi::{Kpi, KpiStatus};
pub use realtime::RealtimeMetrics;
pub use rollup::DailyAggregate;
