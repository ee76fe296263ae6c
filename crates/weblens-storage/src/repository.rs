use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use weblens_types::{
    AnalysisResult, DailyMetrics, Event, EventType, Insight, InsightPriority, InsightStatus,
    InsightType, Session, Workspace,
};

/// Filter for event list queries. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub workspace_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub event_type: Option<EventType>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Filter for session list queries.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub workspace_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Filter for insight list queries.
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    pub workspace_id: Option<Uuid>,
    pub status: Option<InsightStatus>,
    pub insight_type: Option<InsightType>,
    pub priority: Option<InsightPriority>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn create(&self, workspace: Workspace) -> StorageResult<Workspace>;
    async fn get(&self, id: Uuid) -> StorageResult<Option<Workspace>>;
    async fn get_by_api_key(&self, api_key: &str) -> StorageResult<Option<Workspace>>;
}

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn create(&self, result: AnalysisResult) -> StorageResult<AnalysisResult>;
    async fn get(&self, id: Uuid) -> StorageResult<Option<AnalysisResult>>;
    /// Newest first.
    async fn list_by_workspace(
        &self,
        workspace_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<AnalysisResult>>;
    /// All analyses created in [start, end) for a workspace.
    async fn list_in_range(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AnalysisResult>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> StorageResult<Session>;
    async fn get(&self, id: Uuid) -> StorageResult<Option<Session>>;
    /// Newest first by started_at.
    async fn list(&self, filter: SessionFilter) -> StorageResult<Vec<Session>>;
    /// Sessions started in [start, end) for a workspace.
    async fn list_in_range(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Session>>;
    /// Bump the denormalized counters on a session.
    async fn increment_counters(
        &self,
        id: Uuid,
        events_delta: u64,
        page_views_delta: u64,
    ) -> StorageResult<()>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Persist a batch. Per-row best-effort: rows that fail are skipped and
    /// the number of stored rows is returned.
    async fn create_bulk(&self, events: Vec<Event>) -> StorageResult<usize>;
    /// Newest first by timestamp.
    async fn list(&self, filter: EventFilter) -> StorageResult<Vec<Event>>;
    /// Events with timestamps in [start, end) for a workspace.
    async fn list_in_range(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Event>>;
}

#[async_trait]
pub trait InsightRepository: Send + Sync {
    async fn create_bulk(&self, insights: Vec<Insight>) -> StorageResult<usize>;
    async fn get(&self, id: Uuid) -> StorageResult<Option<Insight>>;
    /// Newest first.
    async fn list(&self, filter: InsightFilter) -> StorageResult<Vec<Insight>>;
    /// Idempotent status transition; bumps updated_at.
    async fn update_status(&self, id: Uuid, status: InsightStatus) -> StorageResult<Insight>;
}

#[async_trait]
pub trait DailyMetricsRepository: Send + Sync {
    /// Insert-or-replace keyed by (workspace_id, date).
    async fn upsert(&self, row: DailyMetrics) -> StorageResult<DailyMetrics>;
    async fn get(&self, workspace_id: Uuid, date: NaiveDate) -> StorageResult<Option<DailyMetrics>>;
    /// Rows with date in [from, to], ascending by date.
    async fn list_range(
        &self,
        workspace_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StorageResult<Vec<DailyMetrics>>;
}
