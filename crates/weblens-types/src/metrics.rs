use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Precomputed per-workspace per-day rollup.
///
/// At most one row exists per (workspace_id, date); the storage layer
/// enforces the uniqueness. Nullable fields stay `None` for days where the
/// underlying raw data carried no signal (e.g. no sessions with durations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// UTC day this row aggregates
    pub date: NaiveDate,
    pub total_sessions: u64,
    pub total_page_views: u64,
    pub unique_visitors: u64,
    /// Percentage of bounced sessions, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_rate: Option<f64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_session_duration: Option<f64>,
    /// Percentage, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_rate: Option<f64>,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_load_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl DailyMetrics {
    pub fn empty(workspace_id: Uuid, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            date,
            total_sessions: 0,
            total_page_views: 0,
            unique_visitors: 0,
            bounce_rate: None,
            avg_session_duration: None,
            conversion_rate: None,
            avg_load_time: None,
            created_at: Utc::now(),
        }
    }
}
