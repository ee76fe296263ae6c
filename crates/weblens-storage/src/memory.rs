//! In-memory repository adapters.
//!
//! Backs the default server wiring and the test suites. Collections are
//! concurrent maps; list queries materialize, filter and sort, which is fine
//! at the scale the in-memory store is meant for.

use crate::repository::*;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;
use weblens_types::{
    AnalysisResult, DailyMetrics, Event, Insight, InsightStatus, Session, Workspace,
};

/// All entity collections in one handle. Clone is cheap (shared maps).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    workspaces: Arc<DashMap<Uuid, Workspace>>,
    analyses: Arc<DashMap<Uuid, AnalysisResult>>,
    sessions: Arc<DashMap<Uuid, Session>>,
    events: Arc<DashMap<Uuid, Event>>,
    insights: Arc<DashMap<Uuid, Insight>>,
    daily_metrics: Arc<DashMap<(Uuid, NaiveDate), DailyMetrics>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(mut items: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> Vec<T> {
    let offset = offset.unwrap_or(0);
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

#[async_trait]
impl WorkspaceRepository for InMemoryStore {
    async fn create(&self, workspace: Workspace) -> StorageResult<Workspace> {
        let duplicate = self
            .workspaces
            .iter()
            .any(|entry| entry.value().api_key == workspace.api_key);
        if duplicate {
            return Err(StorageError::Conflict {
                entity: "workspace",
                message: "api_key already in use".to_string(),
            });
        }
        self.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Workspace>> {
        Ok(self.workspaces.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_by_api_key(&self, api_key: &str) -> StorageResult<Option<Workspace>> {
        Ok(self
            .workspaces
            .iter()
            .find(|entry| entry.value().api_key == api_key)
            .map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryStore {
    async fn create(&self, result: AnalysisResult) -> StorageResult<AnalysisResult> {
        self.analyses.insert(result.id, result.clone());
        Ok(result)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<AnalysisResult>> {
        Ok(self.analyses.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_by_workspace(
        &self,
        workspace_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<AnalysisResult>> {
        let mut results: Vec<AnalysisResult> = self
            .analyses
            .iter()
            .filter(|entry| entry.value().workspace_id == workspace_id)
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(results, Some(limit), Some(offset)))
    }

    async fn list_in_range(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AnalysisResult>> {
        Ok(self
            .analyses
            .iter()
            .filter(|entry| {
                let a = entry.value();
                a.workspace_id == workspace_id && a.created_at >= start && a.created_at < end
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create(&self, session: Session) -> StorageResult<Session> {
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Session>> {
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self, filter: SessionFilter) -> StorageResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| {
                let s = entry.value();
                filter.workspace_id.map_or(true, |id| s.workspace_id == id)
                    && filter
                        .user_id
                        .as_deref()
                        .map_or(true, |u| s.user_id.as_deref() == Some(u))
                    && filter.start_time.map_or(true, |t| s.started_at >= t)
                    && filter.end_time.map_or(true, |t| s.started_at < t)
            })
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(paginate(sessions, filter.limit, filter.offset))
    }

    async fn list_in_range(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| {
                let s = entry.value();
                s.workspace_id == workspace_id && s.started_at >= start && s.started_at < end
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn increment_counters(
        &self,
        id: Uuid,
        events_delta: u64,
        page_views_delta: u64,
    ) -> StorageResult<()> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(StorageError::NotFound {
                entity: "session",
                id,
            })?;
        entry.events_count += events_delta;
        entry.page_views += page_views_delta;
        Ok(())
    }
}

#[async_trait]
impl EventRepository for InMemoryStore {
    async fn create_bulk(&self, events: Vec<Event>) -> StorageResult<usize> {
        let mut stored = 0;
        for event in events {
            self.events.insert(event.id, event);
            stored += 1;
        }
        Ok(stored)
    }

    async fn list(&self, filter: EventFilter) -> StorageResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|entry| {
                let e = entry.value();
                filter.workspace_id.map_or(true, |id| e.workspace_id == id)
                    && filter.session_id.map_or(true, |id| e.session_id == id)
                    && filter.event_type.map_or(true, |t| e.event_type == t)
                    && filter.start_time.map_or(true, |t| e.timestamp >= t)
                    && filter.end_time.map_or(true, |t| e.timestamp < t)
            })
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(events, filter.limit, filter.offset))
    }

    async fn list_in_range(
        &self,
        workspace_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Event>> {
        Ok(self
            .events
            .iter()
            .filter(|entry| {
                let e = entry.value();
                e.workspace_id == workspace_id && e.timestamp >= start && e.timestamp < end
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[async_trait]
impl InsightRepository for InMemoryStore {
    async fn create_bulk(&self, insights: Vec<Insight>) -> StorageResult<usize> {
        let mut stored = 0;
        for insight in insights {
            self.insights.insert(insight.id, insight);
            stored += 1;
        }
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Insight>> {
        Ok(self.insights.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self, filter: InsightFilter) -> StorageResult<Vec<Insight>> {
        let mut insights: Vec<Insight> = self
            .insights
            .iter()
            .filter(|entry| {
                let i = entry.value();
                filter.workspace_id.map_or(true, |id| i.workspace_id == id)
                    && filter.status.map_or(true, |s| i.status == s)
                    && filter.insight_type.map_or(true, |t| i.insight_type == t)
                    && filter.priority.map_or(true, |p| i.priority == p)
            })
            .map(|entry| entry.value().clone())
            .collect();
        insights.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(insights, filter.limit, filter.offset))
    }

    async fn update_status(&self, id: Uuid, status: InsightStatus) -> StorageResult<Insight> {
        let mut entry = self
            .insights
            .get_mut(&id)
            .ok_or(StorageError::NotFound {
                entity: "insight",
                id,
            })?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl DailyMetricsRepository for InMemoryStore {
    async fn upsert(&self, row: DailyMetrics) -> StorageResult<DailyMetrics> {
        self.daily_metrics
            .insert((row.workspace_id, row.date), row.clone());
        Ok(row)
    }

    async fn get(&self, workspace_id: Uuid, date: NaiveDate) -> StorageResult<Option<DailyMetrics>> {
        Ok(self
            .daily_metrics
            .get(&(workspace_id, date))
            .map(|entry| entry.value().clone()))
    }

    async fn list_range(
        &self,
        workspace_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StorageResult<Vec<DailyMetrics>> {
        let mut rows: Vec<DailyMetrics> = self
            .daily_metrics
            .iter()
            .filter(|entry| {
                let m = entry.value();
                m.workspace_id == workspace_id && m.date >= from && m.date <= to
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|m| m.date);
        Ok(rows)
    }
}
