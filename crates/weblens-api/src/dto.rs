use crate::errors::{ApiError, ApiResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;
use weblens_analysis::AnalysisOptions;
use weblens_metrics::Granularity;
use weblens_types::{EventType, InsightPriority, InsightStatus, InsightType};

/// Upper bound on URLs accepted by one batch request.
pub const MAX_BATCH_URLS: usize = 50;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;
const INSIGHTS_DEFAULT_LIMIT: usize = 50;
const INSIGHTS_MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub options: Option<AnalysisOptions>,
}

impl AnalyzeRequest {
    /// Fold the top-level user-agent override into the options block.
    pub fn into_options(self) -> (String, Uuid, Option<Uuid>, AnalysisOptions) {
        let mut options = self.options.unwrap_or_default();
        if options.user_agent.is_none() {
            options.user_agent = self.user_agent;
        }
        (self.url, self.workspace_id, self.session_id, options)
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub options: Option<AnalysisOptions>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub workspace_id: Uuid,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl EventsQuery {
    pub fn event_type_parsed(&self) -> ApiResult<Option<EventType>> {
        self.event_type
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ApiError::validation(format!("unknown event_type: {raw}")))
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub workspace_id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    pub workspace_id: Uuid,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub insight_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInsightStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateInsightsRequest {
    pub workspace_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub workspace_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQueryParams {
    pub workspace_id: Uuid,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub granularity: Option<String>,
}

/// Validate a general list limit: [1, 1000], defaulting to 100.
pub fn validate_limit(limit: Option<usize>) -> ApiResult<usize> {
    match limit {
        None => Ok(DEFAULT_LIST_LIMIT),
        Some(value) if (1..=MAX_LIST_LIMIT).contains(&value) => Ok(value),
        Some(value) => Err(ApiError::invalid_request(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}, got {value}"
        ))),
    }
}

/// Insights use a tighter window: [1, 100], defaulting to 50.
pub fn validate_insights_limit(limit: Option<usize>) -> ApiResult<usize> {
    match limit {
        None => Ok(INSIGHTS_DEFAULT_LIMIT),
        Some(value) if (1..=INSIGHTS_MAX_LIMIT).contains(&value) => Ok(value),
        Some(value) => Err(ApiError::invalid_request(format!(
            "limit must be between 1 and {INSIGHTS_MAX_LIMIT}, got {value}"
        ))),
    }
}

pub fn parse_insight_status(raw: &str) -> ApiResult<InsightStatus> {
    match raw {
        "pending" => Ok(InsightStatus::Pending),
        "applied" => Ok(InsightStatus::Applied),
        "dismissed" => Ok(InsightStatus::Dismissed),
        other => Err(ApiError::validation(format!("unknown status: {other}"))),
    }
}

pub fn parse_insight_type(raw: &str) -> ApiResult<InsightType> {
    match raw {
        "performance_bottleneck" => Ok(InsightType::PerformanceBottleneck),
        "seo_optimization" => Ok(InsightType::SeoOptimization),
        "accessibility_issue" => Ok(InsightType::AccessibilityIssue),
        "conversion_funnel" => Ok(InsightType::ConversionFunnel),
        "security_issue" => Ok(InsightType::SecurityIssue),
        other => Err(ApiError::validation(format!("unknown insight type: {other}"))),
    }
}

pub fn parse_insight_priority(raw: &str) -> ApiResult<InsightPriority> {
    match raw {
        "critical" => Ok(InsightPriority::Critical),
        "high" => Ok(InsightPriority::High),
        "medium" => Ok(InsightPriority::Medium),
        "low" => Ok(InsightPriority::Low),
        other => Err(ApiError::validation(format!("unknown priority: {other}"))),
    }
}

pub fn parse_granularity(raw: Option<&str>) -> ApiResult<Granularity> {
    match raw.unwrap_or("daily") {
        "hourly" => Ok(Granularity::Hourly),
        "daily" => Ok(Granularity::Daily),
        "weekly" => Ok(Granularity::Weekly),
        "monthly" => Ok(Granularity::Monthly),
        other => Err(ApiError::invalid_request(format!(
            "unknown granularity: {other}"
        ))),
    }
}

/// Accept RFC3339 timestamps or bare dates (interpreted as UTC midnight).
pub fn parse_date(raw: &str, field: &str) -> ApiResult<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc());
    }
    Err(ApiError::invalid_request(format!(
        "{field} must be an RFC3339 timestamp or YYYY-MM-DD date, got {raw}"
    )))
}
