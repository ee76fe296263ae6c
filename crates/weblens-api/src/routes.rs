use crate::handlers;
use crate::health;
use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/batch", post(handlers::batch_analyze))
        .route(
            "/events",
            post(handlers::track_events).get(handlers::list_events),
        )
        .route("/sessions", get(handlers::list_sessions))
        .route("/insights", get(handlers::list_insights))
        .route(
            "/insights/:id/status",
            put(handlers::update_insight_status),
        )
        .route("/insights/generate", post(handlers::generate_insights))
        .route(
            "/insights/jobs",
            post(handlers::start_insight_job).get(handlers::list_insight_jobs),
        )
        .route("/insights/jobs/:id", get(handlers::get_insight_job))
        .route("/metrics", get(handlers::get_metrics));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/live", get(health::live))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .with_state(state)
}
