use crate::config::AppConfig;
use crate::errors::{ApiError, ApiResult};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;
use weblens_analysis::AnalysisEngine;
use weblens_analysis::technology::TechnologyAnalyzer;
use weblens_fetch::{Fetcher, FetcherConfig};
use weblens_fingerprint::{DetectionMetrics, PatternFingerprint};
use weblens_ingest::{EventIngestService, WorkspaceRateLimiter};
use weblens_insights::rules::default_rules;
use weblens_insights::{InsightJobManager, InsightService, RuleRegistry};
use weblens_metrics::MetricsEngine;
use weblens_storage::{
    AnalysisRepository, EventRepository, InMemoryStore, InsightRepository, SessionRepository,
    WorkspaceRepository,
};
use weblens_types::Workspace;

/// Everything the handlers need, wired once at startup. Clone is cheap;
/// all members share their underlying state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: InMemoryStore,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub events: Arc<dyn EventRepository>,
    pub insights: Arc<dyn InsightRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
    pub engine: AnalysisEngine,
    pub ingest: EventIngestService,
    pub metrics: MetricsEngine,
    pub insight_service: InsightService,
    pub jobs: InsightJobManager,
    pub detection_metrics: Arc<DetectionMetrics>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = InMemoryStore::new();
        let workspaces: Arc<dyn WorkspaceRepository> = Arc::new(store.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(store.clone());
        let events: Arc<dyn EventRepository> = Arc::new(store.clone());
        let insights: Arc<dyn InsightRepository> = Arc::new(store.clone());
        let analyses: Arc<dyn AnalysisRepository> = Arc::new(store.clone());

        let detection_metrics = Arc::new(DetectionMetrics::new());
        let fetcher = Fetcher::new(FetcherConfig {
            timeout: config.fetch_timeout,
            ..FetcherConfig::default()
        })?;
        let default_user_agent = FetcherConfig::default().user_agent;
        let technology = TechnologyAnalyzer::new(
            Arc::new(PatternFingerprint::new()),
            detection_metrics.clone(),
        );
        let engine = AnalysisEngine::new(
            fetcher,
            technology,
            analyses.clone(),
            default_user_agent,
        );

        let ingest = EventIngestService::new(
            sessions.clone(),
            events.clone(),
            Arc::new(WorkspaceRateLimiter::new(config.events_per_minute)),
        );

        let metrics = MetricsEngine::new(
            sessions.clone(),
            events.clone(),
            analyses.clone(),
            Arc::new(store.clone()),
        );

        let registry = Arc::new(RuleRegistry::new());
        for rule in default_rules() {
            registry
                .register(rule)
                .await
                .map_err(|e| anyhow::anyhow!("rule registration failed: {e}"))?;
        }
        let insight_service = InsightService::new(
            registry,
            analyses.clone(),
            sessions.clone(),
            events.clone(),
            insights.clone(),
        );
        let jobs = InsightJobManager::new(insight_service.clone());

        let state = Self {
            config,
            store,
            workspaces,
            sessions,
            events,
            insights,
            analyses,
            engine,
            ingest,
            metrics,
            insight_service,
            jobs,
            detection_metrics,
            started_at: Instant::now(),
        };

        if let Some(api_key) = state.config.bootstrap_api_key.clone() {
            let workspace = Workspace::new("default", api_key, state.config.default_rate_limit);
            let id = workspace.id;
            state.workspaces.create(workspace).await?;
            tracing::info!(workspace_id = %id, "bootstrap workspace created");
        }

        Ok(state)
    }

    /// Resolve a workspace that must exist and be active.
    pub async fn require_workspace(&self, id: Uuid) -> ApiResult<Workspace> {
        let workspace = self
            .workspaces
            .get(id)
            .await?
            .ok_or(ApiError::WorkspaceNotFound { id })?;
        if !workspace.active {
            return Err(ApiError::WorkspaceInactive { id });
        }
        Ok(workspace)
    }
}
