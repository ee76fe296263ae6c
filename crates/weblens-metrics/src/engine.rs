use crate::anomaly::{detect_anomalies, Anomaly};
use crate::kpi::{build_kpis, Kpi};
use crate::realtime::RealtimeMetrics;
use crate::rollup::DailyAggregate;
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;
use weblens_storage::{
    AnalysisRepository, DailyMetricsRepository, EventRepository, SessionRepository, StorageError,
};
use weblens_types::DailyMetrics;

/// Days of daily rows fed into anomaly detection.
const ANOMALY_WINDOW_DAYS: u64 = 30;
/// Relative change below which a metric counts as stable.
const TREND_THRESHOLD_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn max_range_days(&self) -> i64 {
        match self {
            Granularity::Hourly => 7,
            Granularity::Daily => 90,
            Granularity::Weekly => 365,
            Granularity::Monthly => 730,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsQuery {
    pub workspace_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub granularity: Granularity,
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid date range: {message}")]
    InvalidRange { message: String },

    #[error("date range exceeds the {max_days} day maximum for {granularity:?} granularity")]
    RangeTooLarge {
        granularity: Granularity,
        max_days: i64,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("metrics query cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    pub points: Vec<DataPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
}

#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub granularity: Granularity,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub totals: RealtimeMetrics,
    pub series: HashMap<&'static str, MetricSeries>,
    pub kpis: Vec<Kpi>,
    pub anomalies: Vec<Anomaly>,
    /// False when any day in the range had to be computed from raw data.
    pub from_precomputed: bool,
}

/// Granularity-aware metrics queries over one workspace.
#[derive(Clone)]
pub struct MetricsEngine {
    sessions: Arc<dyn SessionRepository>,
    events: Arc<dyn EventRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    daily: Arc<dyn DailyMetricsRepository>,
}

impl MetricsEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        events: Arc<dyn EventRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        daily: Arc<dyn DailyMetricsRepository>,
    ) -> Self {
        Self {
            sessions,
            events,
            analyses,
            daily,
        }
    }

    #[instrument(skip(self, cancel), fields(workspace_id = %query.workspace_id, granularity = ?query.granularity))]
    pub async fn get_metrics(
        &self,
        query: MetricsQuery,
        cancel: &CancellationToken,
    ) -> Result<MetricsReport, MetricsError> {
        if query.end_date <= query.start_date {
            return Err(MetricsError::InvalidRange {
                message: "end_date must be after start_date".to_string(),
            });
        }
        let span_days = (query.end_date - query.start_date).num_days();
        let max_days = query.granularity.max_range_days();
        if span_days > max_days {
            return Err(MetricsError::RangeTooLarge {
                granularity: query.granularity,
                max_days,
            });
        }

        match query.granularity {
            Granularity::Hourly => self.hourly(query, cancel).await,
            Granularity::Daily => self.bucketed(query, cancel, Bucket::Day).await,
            Granularity::Weekly => self.bucketed(query, cancel, Bucket::IsoWeek).await,
            Granularity::Monthly => self.bucketed(query, cancel, Bucket::Month).await,
        }
    }

    /// Compute one day's rollup from raw rows and persist it. Returns the
    /// stored row.
    pub async fn compute_daily_rollup(
        &self,
        workspace_id: Uuid,
        date: NaiveDate,
    ) -> Result<DailyMetrics, MetricsError> {
        let row = self
            .compute_day(workspace_id, date, &CancellationToken::new())
            .await?;
        Ok(self.daily.upsert(row).await?)
    }

    async fn hourly(
        &self,
        query: MetricsQuery,
        cancel: &CancellationToken,
    ) -> Result<MetricsReport, MetricsError> {
        let mut points = Vec::new();
        let mut slice_start = query.start_date;
        while slice_start < query.end_date {
            if cancel.is_cancelled() {
                return Err(MetricsError::Cancelled);
            }
            let slice_end = (slice_start + Duration::hours(1)).min(query.end_date);
            let metrics = self
                .realtime_window(query.workspace_id, slice_start, slice_end)
                .await?;
            if let Some(rate) = metrics.conversion_rate {
                points.push(DataPoint {
                    timestamp: slice_start,
                    value: rate,
                });
            }
            slice_start = slice_end;
        }

        if cancel.is_cancelled() {
            return Err(MetricsError::Cancelled);
        }
        let totals = self
            .realtime_window(query.workspace_id, query.start_date, query.end_date)
            .await?;

        let current = DailyAggregate {
            total_sessions: totals.total_sessions,
            total_page_views: totals.total_page_views,
            unique_visitors: totals.unique_visitors,
            bounce_rate: totals.bounce_rate,
            avg_session_duration: totals.avg_session_duration,
            conversion_rate: totals.conversion_rate,
            avg_load_time: totals.avg_load_time,
        };
        let kpis = build_kpis(&current, &DailyAggregate::default());
        let anomalies = self.anomalies_for(query.workspace_id, query.end_date).await?;

        let mut series = HashMap::new();
        series.insert(
            "conversion_rate",
            MetricSeries {
                points,
                current: totals.conversion_rate,
                previous: None,
                trend: None,
            },
        );

        Ok(MetricsReport {
            granularity: Granularity::Hourly,
            start_date: query.start_date,
            end_date: query.end_date,
            totals,
            series,
            kpis,
            anomalies,
            from_precomputed: false,
        })
    }

    async fn bucketed(
        &self,
        query: MetricsQuery,
        cancel: &CancellationToken,
        bucket: Bucket,
    ) -> Result<MetricsReport, MetricsError> {
        let from = query.start_date.date_naive();
        let to = query.end_date.date_naive();

        let (rows, all_precomputed) = self
            .load_daily_rows(query.workspace_id, from, to, cancel)
            .await?;

        // Previous period of equal length, immediately before the range.
        let period_days = (to - from).num_days() as u64 + 1;
        let prev_to = from.pred_opt().unwrap_or(from);
        let prev_from = prev_to
            .checked_sub_days(Days::new(period_days - 1))
            .unwrap_or(prev_to);
        let (previous_rows, _) = self
            .load_daily_rows(query.workspace_id, prev_from, prev_to, cancel)
            .await?;

        let current = DailyAggregate::from_rows(&rows);
        let previous = DailyAggregate::from_rows(&previous_rows);

        let buckets = group_rows(&rows, bucket);
        let mut series = HashMap::new();
        for (metric, current_value, previous_value, inverted) in [
            (
                "conversion_rate",
                current.conversion_rate,
                previous.conversion_rate,
                false,
            ),
            ("bounce_rate", current.bounce_rate, previous.bounce_rate, true),
            (
                "avg_session_duration",
                current.avg_session_duration,
                previous.avg_session_duration,
                false,
            ),
            ("avg_load_time", current.avg_load_time, previous.avg_load_time, true),
        ] {
            let points = buckets
                .iter()
                .filter_map(|(start, aggregate)| {
                    metric_of(aggregate, metric).map(|value| DataPoint {
                        timestamp: start.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc(),
                        value,
                    })
                })
                .collect();
            series.insert(
                metric,
                MetricSeries {
                    points,
                    current: current_value,
                    previous: previous_value,
                    trend: trend_of(current_value, previous_value, inverted),
                },
            );
        }

        let kpis = build_kpis(&current, &previous);
        let anomalies = self.anomalies_for(query.workspace_id, query.end_date).await?;

        let totals = RealtimeMetrics {
            total_sessions: current.total_sessions,
            total_page_views: current.total_page_views,
            unique_visitors: current.unique_visitors,
            bounce_rate: current.bounce_rate,
            avg_session_duration: current.avg_session_duration,
            conversion_rate: current.conversion_rate,
            avg_load_time: current.avg_load_time,
        };

        Ok(MetricsReport {
            granularity: query.granularity,
            start_date: query.start_date,
            end_date: query.end_date,
            totals,
            series,
            kpis,
            anomalies,
            from_precomputed: all_precomputed,
        })
    }

    /// Load the rollup rows for [from, to]; days without a row are computed
    /// from raw data on the fly (not persisted). The second value reports
    /// whether every day came precomputed.
    async fn load_daily_rows(
        &self,
        workspace_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<(Vec<DailyMetrics>, bool), MetricsError> {
        let existing = self.daily.list_range(workspace_id, from, to).await?;
        let by_date: HashMap<NaiveDate, DailyMetrics> =
            existing.into_iter().map(|row| (row.date, row)).collect();

        let mut rows = Vec::new();
        let mut all_precomputed = true;
        let mut day = from;
        while day <= to {
            if cancel.is_cancelled() {
                return Err(MetricsError::Cancelled);
            }
            match by_date.get(&day) {
                Some(row) => rows.push(row.clone()),
                None => {
                    all_precomputed = false;
                    debug!(%workspace_id, date = %day, "no rollup row; computing from raw data");
                    rows.push(self.compute_day(workspace_id, day, cancel).await?);
                }
            }
            day = day.succ_opt().ok_or_else(|| MetricsError::InvalidRange {
                message: "date overflow".to_string(),
            })?;
        }
        Ok((rows, all_precomputed))
    }

    async fn compute_day(
        &self,
        workspace_id: Uuid,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<DailyMetrics, MetricsError> {
        if cancel.is_cancelled() {
            return Err(MetricsError::Cancelled);
        }
        let start = date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
        let end = start + Duration::days(1);
        let metrics = self.realtime_window(workspace_id, start, end).await?;

        let mut row = DailyMetrics::empty(workspace_id, date);
        row.total_sessions = metrics.total_sessions;
        row.total_page_views = metrics.total_page_views;
        row.unique_visitors = metrics.unique_visitors;
        row.bounce_rate = metrics.bounce_rate;
        row.avg_session_duration = metrics.avg_session_duration;
        row.conversion_rate = metrics.conversion_rate;
        row.avg_load_time = metrics.avg_load_time;
        Ok(row)
    }

    async fn realtime_window(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RealtimeMetrics, MetricsError> {
        let sessions = self.sessions.list_in_range(workspace_id, start, end).await?;
        let events = self.events.list_in_range(workspace_id, start, end).await?;
        let analyses = self.analyses.list_in_range(workspace_id, start, end).await?;
        Ok(RealtimeMetrics::compute(&sessions, &events, &analyses))
    }

    async fn anomalies_for(
        &self,
        workspace_id: Uuid,
        end: DateTime<Utc>,
    ) -> Result<Vec<Anomaly>, MetricsError> {
        let to = end.date_naive();
        let from = to
            .checked_sub_days(Days::new(ANOMALY_WINDOW_DAYS - 1))
            .unwrap_or(to);
        let rows = self.daily.list_range(workspace_id, from, to).await?;
        Ok(detect_anomalies(&rows))
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Day,
    IsoWeek,
    Month,
}

/// Group rows into bucket-start keyed aggregates, ascending.
fn group_rows(rows: &[DailyMetrics], bucket: Bucket) -> Vec<(NaiveDate, DailyAggregate)> {
    let mut grouped: BTreeMap<NaiveDate, Vec<DailyMetrics>> = BTreeMap::new();
    for row in rows {
        let key = match bucket {
            Bucket::Day => row.date,
            Bucket::IsoWeek => row.date.week(Weekday::Mon).first_day(),
            Bucket::Month => row.date.with_day(1).expect("day one exists"),
        };
        grouped.entry(key).or_default().push(row.clone());
    }
    grouped
        .into_iter()
        .map(|(start, rows)| (start, DailyAggregate::from_rows(&rows)))
        .collect()
}

fn metric_of(aggregate: &DailyAggregate, metric: &str) -> Option<f64> {
    match metric {
        "conversion_rate" => aggregate.conversion_rate,
        "bounce_rate" => aggregate.bounce_rate,
        "avg_session_duration" => aggregate.avg_session_duration,
        "avg_load_time" => aggregate.avg_load_time,
        _ => None,
    }
}

/// Trend of current vs previous: stable inside ±5% change, otherwise up or
/// down with the sense inverted for cost metrics (bounce rate, load time)
/// where a decrease is an improvement.
fn trend_of(current: Option<f64>, previous: Option<f64>, inverted: bool) -> Option<Trend> {
    let (current, previous) = (current?, previous?);
    if previous == 0.0 {
        return Some(Trend::Stable);
    }
    let change_percent = 100.0 * (current - previous) / previous;
    let trend = if change_percent.abs() <= TREND_THRESHOLD_PERCENT {
        Trend::Stable
    } else if (change_percent > 0.0) != inverted {
        Trend::Up
    } else {
        Trend::Down
    };
    Some(trend)
}
