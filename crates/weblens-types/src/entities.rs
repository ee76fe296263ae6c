use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Free-form JSON map used for the analysis dimensions.
///
/// Analyzers write structured payloads into these maps; the API serves them
/// back verbatim. Backing them with `serde_json::Value` preserves the exact
/// wire shape across store/load cycles.
pub type DimensionMap = HashMap<String, serde_json::Value>;

/// Tenant boundary. All persisted data is scoped to exactly one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Immutable workspace identifier
    pub id: Uuid,
    pub name: String,
    /// Unique API key used for request authentication
    pub api_key: String,
    pub active: bool,
    /// Allowed requests per hour for this workspace
    pub rate_limit: u32,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, rate_limit: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            api_key: api_key.into(),
            active: true,
            rate_limit,
            created_at: Utc::now(),
        }
    }
}

/// One analysis of one URL at one point in time.
///
/// The five dimension maps are opaque to everything outside the analyzers.
/// Invariant: when `session_id` is set, the referenced session belongs to
/// `workspace_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub workspace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub url: String,
    pub technologies: DimensionMap,
    pub performance_metrics: DimensionMap,
    pub seo_metrics: DimensionMap,
    pub accessibility_metrics: DimensionMap,
    pub security_metrics: DimensionMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(workspace_id: Uuid, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            session_id: None,
            url: url.into(),
            technologies: DimensionMap::new(),
            performance_metrics: DimensionMap::new(),
            seo_metrics: DimensionMap::new(),
            accessibility_metrics: DimensionMap::new(),
            security_metrics: DimensionMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A logical user visit.
///
/// `page_views` and `events_count` are denormalized counters maintained by
/// the ingestion service; `page_views` counts only events of type
/// `pageview`, so `events_count >= page_views` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub workspace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub page_views: u64,
    pub events_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl Session {
    /// Create an empty session starting now. Used by the ingestion service
    /// when events arrive for an unknown session id.
    pub fn started_now(id: Uuid, workspace_id: Uuid) -> Self {
        Self {
            id,
            workspace_id,
            user_id: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            page_views: 0,
            events_count: 0,
            device_type: None,
            browser: None,
            country: None,
            referrer: None,
        }
    }

    /// A bounced session has at most one page view.
    pub fn is_bounce(&self) -> bool {
        self.page_views <= 1
    }
}
