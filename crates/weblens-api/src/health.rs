use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use weblens_storage::WorkspaceRepository;

const HEALTH_BUDGET: Duration = Duration::from_secs(10);
const READINESS_BUDGET: Duration = Duration::from_secs(5);

/// GET /health — full health envelope with dependency status.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage_ok = matches!(
        tokio::time::timeout(HEALTH_BUDGET, storage_reachable(&state)).await,
        Ok(true)
    );
    let detection = state.detection_metrics.snapshot();

    let status = if storage_ok { "healthy" } else { "degraded" };
    let code = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "timestamp": Utc::now().to_rfc3339(),
            "dependencies": {
                "storage": {"status": if storage_ok { "healthy" } else { "unhealthy" }},
            },
            "detection": detection,
        })),
    )
}

/// GET /ready — can this instance serve traffic right now.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let probe = tokio::time::timeout(READINESS_BUDGET, storage_reachable(&state)).await;
    match probe {
        Ok(true) => (StatusCode::OK, Json(json!({"ready": true}))).into_response(),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false})),
        )
            .into_response(),
    }
}

/// GET /live — process liveness only.
pub async fn live() -> impl IntoResponse {
    Json(json!({"alive": true}))
}

async fn storage_reachable(state: &AppState) -> bool {
    // A lookup by random key exercises the full repository path.
    state
        .workspaces
        .get(uuid::Uuid::new_v4())
        .await
        .is_ok()
}
