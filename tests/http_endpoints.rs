//! Router-level tests for the exposition endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use xray_exporter::config::ServerConfig;
use xray_exporter::health::HealthState;
use xray_exporter::http::server::build_router;
use xray_exporter::http::AppState;
use xray_exporter::pipeline::Collector;

mod common;
use common::{sample_value, test_config, trace, ScriptedBackend};

async fn get(state: &AppState, path: &str) -> (StatusCode, Option<String>, String) {
    let router = build_router(&ServerConfig::default(), state.clone());
    let response = router
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

fn state_for(collector: &Collector, health: Arc<HealthState>) -> AppState {
    AppState {
        snapshots: collector.snapshots(),
        health,
        self_metrics: None,
    }
}

#[tokio::test]
async fn test_metrics_serves_latest_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "checkout", "/pay", 200, 10.0));
    backend.add(trace("1-b", "checkout", "/pay", 503, 30.0));

    let health = Arc::new(HealthState::new());
    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), health.clone());
    let state = state_for(&collector, health);

    let (status, content_type, body) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain; version=0.0.4"));
    assert_eq!(sample_value(&body, "xray_exporter_heartbeat"), Some(0.0));
    assert!(!body.contains("xray_service_requests_total"));

    collector.run_cycle_at(1_700_000_000).await.unwrap();

    let (_, _, body) = get(&state, "/metrics").await;
    assert_eq!(sample_value(&body, r#"xray_service_requests_total{service="checkout"}"#), Some(2.0));
    assert_eq!(sample_value(&body, r#"xray_service_faults_total{service="checkout"}"#), Some(1.0));
    assert_eq!(sample_value(&body, r#"xray_service_latency_p90_ms{service="checkout"}"#), Some(30.0));
    assert_eq!(
        sample_value(&body, r#"xray_url_status_total{status_code="503",url="/pay"}"#),
        Some(1.0)
    );
    assert_eq!(sample_value(&body, "xray_exporter_cycle"), Some(1.0));
}

#[tokio::test]
async fn test_health_follows_last_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    let health = Arc::new(HealthState::new());
    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), health.clone());
    let state = state_for(&collector, health.clone());

    let (status, _, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "STARTING");

    collector.run_cycle_at(1_700_000_000).await.unwrap();
    let (status, _, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    backend.fail_listing();
    assert!(collector.run_cycle_at(1_700_000_060).await.is_err());
    let (status, _, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("last cycle failed"));

    health.record_completed(3, Duration::from_secs(90), Duration::from_secs(48));
    let (status, _, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("exceeded deadline"));
}

#[tokio::test]
async fn test_info_page_and_unknown_paths() {
    let dir = tempfile::tempdir().unwrap();
    let collector = Collector::restore(
        &test_config(dir.path()),
        ScriptedBackend::new(),
        Arc::new(HealthState::new()),
    );
    let state = state_for(&collector, Arc::new(HealthState::new()));

    let (status, content_type, body) = get(&state, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(body.contains("xray_service_dependency_total"));

    let (status, _, body) = get(&state, "/favicon.ico").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");
}
