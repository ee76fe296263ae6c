use crate::dto::*;
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;
use weblens_analysis::{AnalysisRequest, BatchAnalysisRequest};
use weblens_ingest::TrackEventsRequest;
use weblens_metrics::MetricsQuery;
use weblens_storage::{EventFilter, InsightFilter, SessionFilter};

/// POST /api/v1/analyze
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<impl IntoResponse> {
    let (url, workspace_id, session_id, options) = request.into_options();
    state.require_workspace(workspace_id).await?;

    let result = state
        .engine
        .analyze(
            AnalysisRequest {
                url,
                workspace_id,
                session_id,
                options,
            },
            &CancellationToken::new(),
        )
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/batch
pub async fn batch_analyze(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(request.workspace_id).await?;
    if request.urls.is_empty() {
        return Err(ApiError::invalid_request("urls must not be empty"));
    }
    if request.urls.len() > MAX_BATCH_URLS {
        return Err(ApiError::BatchSizeExceeded {
            size: request.urls.len(),
            max: MAX_BATCH_URLS,
        });
    }

    let outcome = state
        .engine
        .analyze_batch(
            BatchAnalysisRequest {
                urls: request.urls,
                workspace_id: request.workspace_id,
                options: request.options.unwrap_or_default(),
            },
            &CancellationToken::new(),
        )
        .await;
    Ok(Json(outcome))
}

/// POST /api/v1/events
pub async fn track_events(
    State(state): State<AppState>,
    Json(request): Json<TrackEventsRequest>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(request.workspace_id).await?;

    let outcome = state
        .ingest
        .track_events(request, &CancellationToken::new())
        .await?;
    Ok(Json(json!({
        "success": true,
        "session_id": outcome.session_id,
        "events_count": outcome.accepted,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// GET /api/v1/events
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(query.workspace_id).await?;
    let limit = validate_limit(query.limit)?;
    let event_type = query.event_type_parsed()?;

    let events = state
        .events
        .list(EventFilter {
            workspace_id: Some(query.workspace_id),
            session_id: query.session_id,
            event_type,
            start_time: query.start_time,
            end_time: query.end_time,
            limit: Some(limit),
            offset: query.offset,
        })
        .await?;

    let filters = json!({
        "session_id": query.session_id,
        "event_type": query.event_type,
        "start_time": query.start_time,
        "end_time": query.end_time,
    });
    Ok(Json(json!({
        "events": events,
        "metadata": {
            "count": events.len(),
            "workspace_id": query.workspace_id,
            "filters": filters,
            "timestamp": Utc::now().to_rfc3339(),
        },
    })))
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(query.workspace_id).await?;
    let limit = validate_limit(query.limit)?;

    let sessions = state
        .sessions
        .list(SessionFilter {
            workspace_id: Some(query.workspace_id),
            user_id: query.user_id.clone(),
            start_time: query.start_time,
            end_time: query.end_time,
            limit: Some(limit),
            offset: query.offset,
        })
        .await?;

    Ok(Json(json!({
        "sessions": sessions,
        "metadata": {
            "count": sessions.len(),
            "workspace_id": query.workspace_id,
            "filters": {
                "user_id": query.user_id,
                "start_time": query.start_time,
                "end_time": query.end_time,
            },
            "timestamp": Utc::now().to_rfc3339(),
        },
    })))
}

/// GET /api/v1/insights
pub async fn list_insights(
    State(state): State<AppState>,
    Query(query): Query<InsightsQuery>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(query.workspace_id).await?;
    let limit = validate_insights_limit(query.limit)?;
    let offset = query.offset.unwrap_or(0);

    let status = query.status.as_deref().map(parse_insight_status).transpose()?;
    let insight_type = query
        .insight_type
        .as_deref()
        .map(parse_insight_type)
        .transpose()?;
    let priority = query
        .priority
        .as_deref()
        .map(parse_insight_priority)
        .transpose()?;

    let insights = state
        .insights
        .list(InsightFilter {
            workspace_id: Some(query.workspace_id),
            status,
            insight_type,
            priority,
            limit: Some(limit),
            offset: Some(offset),
        })
        .await?;

    Ok(Json(json!({
        "insights": insights,
        "pagination": {
            "limit": limit,
            "offset": offset,
            "count": insights.len(),
        },
        "metadata": {
            "workspace_id": query.workspace_id,
            "timestamp": Utc::now().to_rfc3339(),
        },
    })))
}

/// PUT /api/v1/insights/{id}/status
pub async fn update_insight_status(
    State(state): State<AppState>,
    Path(insight_id): Path<Uuid>,
    Json(request): Json<UpdateInsightStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = parse_insight_status(&request.status)?;

    if state.insights.get(insight_id).await?.is_none() {
        return Err(ApiError::InsightNotFound { id: insight_id });
    }
    let updated = state.insights.update_status(insight_id, status).await?;

    info!(insight_id = %insight_id, status = ?status, "insight status updated");
    Ok(Json(json!({
        "success": true,
        "insight_id": insight_id,
        "status": updated.status,
    })))
}

/// POST /api/v1/insights/generate
pub async fn generate_insights(
    State(state): State<AppState>,
    Json(request): Json<GenerateInsightsRequest>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(request.workspace_id).await?;

    let insights = state
        .insight_service
        .generate(request.workspace_id, &CancellationToken::new())
        .await?;
    Ok(Json(json!({
        "success": true,
        "workspace_id": request.workspace_id,
        "insights_generated": insights.len(),
    })))
}

/// POST /api/v1/insights/jobs — dispatch generation to a background job.
pub async fn start_insight_job(
    State(state): State<AppState>,
    Json(request): Json<GenerateInsightsRequest>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(request.workspace_id).await?;
    let job = state
        .jobs
        .start(request.workspace_id, CancellationToken::new());
    Ok(Json(job))
}

/// GET /api/v1/insights/jobs/{id}
pub async fn get_insight_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.get(job_id).ok_or(ApiError::NotFound {
        resource: format!("insight job {job_id}"),
    })?;
    Ok(Json(job))
}

/// GET /api/v1/insights/jobs
pub async fn list_insight_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(query.workspace_id).await?;
    let jobs = state.jobs.list_by_workspace(query.workspace_id);
    let count = jobs.len();
    Ok(Json(json!({
        "jobs": jobs,
        "metadata": {
            "count": count,
            "workspace_id": query.workspace_id,
            "timestamp": Utc::now().to_rfc3339(),
        },
    })))
}

/// GET /api/v1/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    Query(params): Query<MetricsQueryParams>,
) -> ApiResult<impl IntoResponse> {
    state.require_workspace(params.workspace_id).await?;
    let start_date = parse_date(&params.start_date, "start_date")?;
    let end_date = parse_date(&params.end_date, "end_date")?;
    let granularity = parse_granularity(params.granularity.as_deref())?;

    let report = state
        .metrics
        .get_metrics(
            MetricsQuery {
                workspace_id: params.workspace_id,
                start_date,
                end_date,
                granularity,
            },
            &CancellationToken::new(),
        )
        .await?;

    let data_source = if report.from_precomputed {
        "precomputed"
    } else {
        "realtime"
    };
    Ok(Json(json!({
        "metrics": {
            "granularity": report.granularity,
            "start_date": report.start_date,
            "end_date": report.end_date,
            "totals": report.totals,
            "series": report.series,
        },
        "kpis": report.kpis,
        "anomalies": report.anomalies,
        "metadata": {
            "timestamp": Utc::now().to_rfc3339(),
            "from_cache": report.from_precomputed,
            "data_source": data_source,
        },
    })))
}
