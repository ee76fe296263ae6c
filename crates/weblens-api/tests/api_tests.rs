//! End-to-end tests through the router, one per externally observable
//! behavior of the service.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use weblens_api::{build_router, AppConfig, AppState};
use weblens_storage::{
    AnalysisRepository, DailyMetricsRepository, InsightRepository, WorkspaceRepository,
};
use weblens_types::{DailyMetrics, Insight, InsightPriority, InsightType, Workspace};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    router: Router,
    state: AppState,
    workspace_id: Uuid,
}

async fn test_app() -> TestApp {
    let state = AppState::new(AppConfig::default()).await.unwrap();
    let workspace = Workspace::new("test", format!("key-{}", Uuid::new_v4()), 3600);
    let workspace_id = workspace.id;
    WorkspaceRepository::create(&state.store, workspace)
        .await
        .unwrap();
    TestApp {
        router: build_router(state.clone()),
        state,
        workspace_id,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn analyze_detects_wordpress_and_stores_one_row() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>Blog</title><meta name="generator" content="WordPress 5.8" /></head><body><h1>Post</h1></body></html>"#,
        ))
        .mount(&upstream)
        .await;

    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/analyze",
            json!({
                "url": format!("{}/blog", upstream.uri()),
                "workspace_id": app.workspace_id,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["technologies"]["detected"]["WordPress"].is_object());
    assert_eq!(
        body["technologies"]["detected"]["WordPress"]["version"],
        json!("5.8")
    );

    let stored = app
        .state
        .analyses
        .list_by_workspace(app.workspace_id, 10, 0)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn analyze_unknown_workspace_is_enveloped_404() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/analyze",
            json!({"url": "https://example.com", "workspace_id": Uuid::new_v4()}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("WORKSPACE_NOT_FOUND"));
    assert!(body["error"]["timestamp"].is_string());
    assert!(body["correlation_id"].is_string());
}

#[tokio::test]
async fn batch_with_one_bad_host_is_partial() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&upstream)
        .await;

    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/batch",
            json!({
                "urls": [format!("{}/ok", upstream.uri()), "http://127.0.0.1:1/"],
                "workspace_id": app.workspace_id,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("partial"));
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["failed_urls"].as_array().unwrap().len(), 1);
    assert_eq!(body["progress"], json!({"completed": 2, "total": 2}));
}

#[tokio::test]
async fn oversized_batch_is_rejected_with_typed_code() {
    let app = test_app().await;
    let urls: Vec<String> = (0..51).map(|i| format!("https://x{i}.example/")).collect();
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/batch",
            json!({"urls": urls, "workspace_id": app.workspace_id}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BATCH_SIZE_EXCEEDED"));
}

#[tokio::test]
async fn duplicate_event_id_is_stored_once() {
    let app = test_app().await;
    let session_id = Uuid::new_v4();
    let shared = Uuid::new_v4();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events",
            json!({
                "session_id": session_id,
                "workspace_id": app.workspace_id,
                "events": [
                    {"id": shared, "event_type": "pageview", "url": "/"},
                    {"id": shared, "event_type": "click"},
                ],
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["events_count"], json!(1));

    let (status, listed) = send(
        &app.router,
        get(&format!(
            "/api/v1/events?workspace_id={}&session_id={session_id}",
            app.workspace_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["events"].as_array().unwrap().len(), 1);
    assert_eq!(listed["metadata"]["count"], json!(1));
}

#[tokio::test]
async fn event_batch_over_limit_is_invalid_request() {
    let app = test_app().await;
    let events: Vec<Value> = (0..101).map(|_| json!({"event_type": "click"})).collect();
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events",
            json!({
                "session_id": Uuid::new_v4(),
                "workspace_id": app.workspace_id,
                "events": events,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("INVALID_REQUEST"));
}

#[tokio::test]
async fn all_invalid_events_is_validation_failed() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events",
            json!({
                "session_id": Uuid::new_v4(),
                "workspace_id": app.workspace_id,
                "events": [{"event_type": "pageview"}],
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_FAILED"));
}

#[tokio::test]
async fn sessions_listing_returns_created_sessions() {
    let app = test_app().await;
    let session_id = Uuid::new_v4();
    send(
        &app.router,
        post_json(
            "/api/v1/events",
            json!({
                "session_id": session_id,
                "workspace_id": app.workspace_id,
                "events": [{"event_type": "pageview", "url": "/"}],
            }),
        ),
    )
    .await;

    let (status, body) = send(
        &app.router,
        get(&format!("/api/v1/sessions?workspace_id={}", app.workspace_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["page_views"], json!(1));
    assert_eq!(sessions[0]["events_count"], json!(1));
}

#[tokio::test]
async fn insight_status_round_trip_and_filtering() {
    let app = test_app().await;

    let insight = Insight::new(
        app.workspace_id,
        InsightType::SeoOptimization,
        InsightPriority::Medium,
        "Pages lack meta descriptions",
    );
    let insight_id = insight.id;
    app.state.insights.create_bulk(vec![insight]).await.unwrap();

    let (status, body) = send(
        &app.router,
        put_json(
            &format!("/api/v1/insights/{insight_id}/status"),
            json!({"status": "applied"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("applied"));

    // Repeating the update is idempotent.
    let (status, _) = send(
        &app.router,
        put_json(
            &format!("/api/v1/insights/{insight_id}/status"),
            json!({"status": "applied"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, listed) = send(
        &app.router,
        get(&format!(
            "/api/v1/insights?workspace_id={}&status=applied",
            app.workspace_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let insights = listed["insights"].as_array().unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0]["id"], json!(insight_id));
    assert_eq!(listed["pagination"]["limit"], json!(50));
}

#[tokio::test]
async fn unknown_insight_is_enveloped_404() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        put_json(
            &format!("/api/v1/insights/{}/status", Uuid::new_v4()),
            json!({"status": "applied"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("INSIGHT_NOT_FOUND"));
}

#[tokio::test]
async fn insights_limit_bounds_are_enforced() {
    let app = test_app().await;
    for bad in ["0", "101"] {
        let (status, body) = send(
            &app.router,
            get(&format!(
                "/api/v1/insights?workspace_id={}&limit={bad}",
                app.workspace_id
            )),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("INVALID_REQUEST"));
    }
}

#[tokio::test]
async fn generate_insights_persists_pending_insights() {
    let app = test_app().await;

    // Seed an analysis slow enough to trip the load-time rule.
    let mut analysis = weblens_types::AnalysisResult::new(app.workspace_id, "https://slow.example/");
    analysis
        .performance_metrics
        .insert("load_time_ms".into(), json!(9000.0));
    app.state.analyses.create(analysis).await.unwrap();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/insights/generate",
            json!({"workspace_id": app.workspace_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["insights_generated"].as_u64().unwrap() >= 1);

    let (_, listed) = send(
        &app.router,
        get(&format!(
            "/api/v1/insights?workspace_id={}&status=pending",
            app.workspace_id
        )),
    )
    .await;
    assert!(!listed["insights"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn insight_jobs_run_in_the_background() {
    let app = test_app().await;

    let (status, job) = send(
        &app.router,
        post_json(
            "/api/v1/insights/jobs",
            json!({"workspace_id": app.workspace_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], json!("queued"));
    let job_id = job["id"].as_str().unwrap().to_string();

    // Poll until the worker finishes.
    let mut finished = None;
    for _ in 0..100 {
        let (status, current) =
            send(&app.router, get(&format!("/api/v1/insights/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if current["status"] == json!("completed") || current["status"] == json!("failed") {
            finished = Some(current);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let finished = finished.expect("job reached a terminal state");
    assert_eq!(finished["status"], json!("completed"));
    assert_eq!(finished["progress"], json!(100));

    let (status, listed) = send(
        &app.router,
        get(&format!(
            "/api/v1/insights/jobs?workspace_id={}",
            app.workspace_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["metadata"]["count"], json!(1));

    let (status, body) = send(
        &app.router,
        get(&format!("/api/v1/insights/jobs/{}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn metrics_daily_reports_kpis_and_anomalies() {
    let app = test_app().await;
    let start = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

    // 27 quiet days then a 3-day conversion spike; bounce stays at 20.
    for i in 0..30u64 {
        let date = start.checked_add_days(Days::new(i)).unwrap();
        let mut row = DailyMetrics::empty(app.workspace_id, date);
        row.total_sessions = 50;
        row.total_page_views = 200;
        row.unique_visitors = 40;
        row.bounce_rate = Some(20.0);
        row.conversion_rate = Some(match i {
            27 => 8.0,
            28 => 8.5,
            29 => 9.0,
            _ => {
                if i % 2 == 0 {
                    2.1
                } else {
                    1.9
                }
            }
        });
        DailyMetricsRepository::upsert(&app.state.store, row)
            .await
            .unwrap();
    }

    let (status, body) = send(
        &app.router,
        get(&format!(
            "/api/v1/metrics?workspace_id={}&start_date=2026-04-01&end_date=2026-04-30&granularity=daily",
            app.workspace_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let anomalies = body["anomalies"].as_array().unwrap();
    let conversion_anomalies: Vec<&Value> = anomalies
        .iter()
        .filter(|a| a["metric"] == json!("conversion_rate"))
        .collect();
    assert_eq!(conversion_anomalies.len(), 3);
    assert!(conversion_anomalies
        .iter()
        .all(|a| a["severity"] == json!("high")));

    // Bounce averages 20 against a target of 40: inverted ratio is good.
    let kpis = body["kpis"].as_array().unwrap();
    let bounce = kpis
        .iter()
        .find(|k| k["name"] == json!("Bounce Rate"))
        .unwrap();
    assert_eq!(bounce["status"], json!("good"));

    assert_eq!(body["metadata"]["data_source"], json!("precomputed"));
}

#[tokio::test]
async fn metrics_range_validation_is_enveloped() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        get(&format!(
            "/api/v1/metrics?workspace_id={}&start_date=2026-01-01&end_date=2026-06-01&granularity=daily",
            app.workspace_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("INVALID_REQUEST"));
}

#[tokio::test]
async fn health_probes_respond() {
    let app = test_app().await;

    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert!(body["dependencies"]["storage"]["status"].is_string());

    let (status, body) = send(&app.router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));

    let (status, body) = send(&app.router, get("/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], json!(true));
}

#[tokio::test]
async fn rate_limited_workspace_gets_429() {
    let state = AppState::new(AppConfig {
        events_per_minute: 1,
        ..AppConfig::default()
    })
    .await
    .unwrap();
    let workspace = Workspace::new("tight", format!("key-{}", Uuid::new_v4()), 3600);
    let workspace_id = workspace.id;
    WorkspaceRepository::create(&state.store, workspace)
        .await
        .unwrap();
    let router = build_router(state);

    let event_body = |session: Uuid| {
        json!({
            "session_id": session,
            "workspace_id": workspace_id,
            "events": [{"event_type": "click"}],
        })
    };

    let (status, _) = send(&router, post_json("/api/v1/events", event_body(Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send(&router, post_json("/api/v1/events", event_body(Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], json!("RATE_LIMITED"));
}

#[tokio::test]
async fn inactive_workspace_is_forbidden() {
    let state = AppState::new(AppConfig::default()).await.unwrap();
    let mut workspace = Workspace::new("off", format!("key-{}", Uuid::new_v4()), 3600);
    workspace.active = false;
    let workspace_id = workspace.id;
    WorkspaceRepository::create(&state.store, workspace)
        .await
        .unwrap();
    let router = build_router(state);

    let (status, body) = send(
        &router,
        post_json(
            "/api/v1/analyze",
            json!({"url": "https://example.com", "workspace_id": workspace_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("FORBIDDEN"));
}
