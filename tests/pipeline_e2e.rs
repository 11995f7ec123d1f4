//! End-to-end cycles against a scripted backend.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use xray_exporter::backend::document::decode_trace;
use xray_exporter::exposition::render;
use xray_exporter::health::{CycleStatus, HealthState};
use xray_exporter::pipeline::{Collector, CycleError};

mod common;
use common::{sample_value, test_config, trace, ScriptedBackend};

const T0: u64 = 1_700_000_000;

fn requests(collector: &Collector, service: &str) -> u64 {
    collector
        .snapshots()
        .load()
        .counters
        .services
        .get(service)
        .map_or(0, |c| c.requests)
}

#[tokio::test]
async fn test_duplicate_trace_id_counts_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    backend.add(trace("1-dup", "api", "/cart", 200, 10.0));
    backend.add(trace("1-dup", "api", "/cart", 200, 10.0));

    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), Arc::new(HealthState::new()));
    let summary = collector.run_cycle_at(T0).await.unwrap();

    assert_eq!(summary.listed, 2);
    assert_eq!(summary.aggregated, 1);
    assert_eq!(requests(&collector, "api"), 1);
    let snapshot = collector.snapshots().load_full();
    assert_eq!(snapshot.counters.urls["/cart"].requests, 1);
    assert_eq!(snapshot.counters.url_services[&("/cart".to_string(), "api".to_string())].requests, 1);
}

#[tokio::test]
async fn test_failed_batch_does_not_fail_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    for i in 0..20 {
        backend.add(trace(&format!("1-{i:02}"), "api", "/items", 200, 5.0));
    }
    backend.fail_batches_with("1-07");

    let health = Arc::new(HealthState::new());
    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), health.clone());
    let summary = collector.run_cycle_at(T0).await.unwrap();

    assert_eq!(summary.aggregated, 15);
    assert_eq!(summary.batches_dropped, 1);
    assert_eq!(requests(&collector, "api"), 15);
    assert_eq!(health.current().status, CycleStatus::Ok);
    assert!(!collector.ledger().has("1-07"));
    assert!(collector.ledger().has("1-19"));

    // The dropped batch is picked up once the backend recovers.
    backend.heal();
    let summary = collector.run_cycle_at(T0 + 60).await.unwrap();
    assert_eq!(summary.aggregated, 5);
    assert_eq!(summary.already_seen, 15);
    assert_eq!(requests(&collector, "api"), 20);
}

#[tokio::test]
async fn test_refetching_aggregated_traces_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "api", "/a", 500, 10.0));
    backend.add(trace("1-b", "api", "/a", 404, 20.0));

    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), Arc::new(HealthState::new()));
    collector.run_cycle_at(T0).await.unwrap();
    let first = collector.snapshots().load_full();

    collector.run_cycle_at(T0 + 60).await.unwrap();
    let second = collector.snapshots().load_full();

    assert_eq!(second.counters.services, first.counters.services);
    assert_eq!(second.counters.heartbeat, first.counters.heartbeat + 1);
    // Nothing new was seen, so the gauges from the first cycle are now stale.
    assert_eq!(second.gauges.services["api"].cycle, 1);
    assert_eq!(second.cycle, 2);
}

#[tokio::test]
async fn test_restart_keeps_counters_and_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "api", "/a", 200, 10.0));
    backend.add(trace("1-b", "api", "/a", 200, 10.0));

    let mut collector = Collector::restore(&config, backend.clone(), Arc::new(HealthState::new()));
    collector.run_cycle_at(T0).await.unwrap();
    let before = collector.snapshots().load_full();
    drop(collector);

    let mut restarted = Collector::restore(&config, backend.clone(), Arc::new(HealthState::new()));
    let restored = restarted.snapshots().load_full();
    assert_eq!(restored.counters, before.counters);
    assert_eq!(restarted.last_window_end(), Some(T0));
    assert!(restarted.ledger().has("1-a"));

    backend.add(trace("1-c", "api", "/a", 200, 10.0));
    let summary = restarted.run_cycle_at(T0 + 60).await.unwrap();
    assert_eq!(summary.aggregated, 1);
    assert_eq!(summary.window.start, T0 - 5);

    let after = restarted.snapshots().load_full();
    assert_eq!(after.counters.services["api"].requests, 3);
    for (service, counters) in &before.counters.services {
        let now = &after.counters.services[service];
        assert!(now.requests >= counters.requests);
        assert!(now.errors >= counters.errors);
    }
}

#[tokio::test]
async fn test_listing_failure_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "api", "/a", 200, 10.0));

    let health = Arc::new(HealthState::new());
    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), health.clone());
    collector.run_cycle_at(T0).await.unwrap();

    backend.fail_listing();
    backend.add(trace("1-b", "api", "/a", 200, 10.0));
    let err = collector.run_cycle_at(T0 + 60).await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(_)));
    // Retried once before giving up.
    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 3);

    assert_eq!(collector.last_window_end(), Some(T0));
    assert_eq!(collector.snapshots().load().cycle, 1);
    assert_eq!(requests(&collector, "api"), 1);
    assert!(!health.current().is_healthy());

    backend.heal();
    let summary = collector.run_cycle_at(T0 + 120).await.unwrap();
    assert_eq!(summary.window.start, T0 - 5);
    assert_eq!(requests(&collector, "api"), 2);
    assert!(health.current().is_healthy());
}

#[tokio::test]
async fn test_malformed_trace_is_retried_later() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    let mut broken = trace("1-x", "api", "/a", 200, 10.0);
    broken.segments[0].service.clear();
    backend.add(broken);

    let mut collector = Collector::restore(&test_config(dir.path()), backend.clone(), Arc::new(HealthState::new()));
    let summary = collector.run_cycle_at(T0).await.unwrap();
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.aggregated, 0);
    assert!(!collector.ledger().has("1-x"));

    backend.replace(trace("1-x", "api", "/a", 200, 10.0));
    let summary = collector.run_cycle_at(T0 + 60).await.unwrap();
    assert_eq!(summary.aggregated, 1);
    assert!(collector.ledger().has("1-x"));
}

#[tokio::test]
async fn test_forced_full_collection_ignores_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "api", "/a", 200, 10.0));

    let mut collector = Collector::restore(&config, backend.clone(), Arc::new(HealthState::new()));
    collector.run_cycle_at(T0).await.unwrap();
    drop(collector);

    config.collector.force_full_collection = true;
    let mut backfill = Collector::restore(&config, backend.clone(), Arc::new(HealthState::new()));
    let summary = backfill.run_cycle_at(T0 + 60).await.unwrap();
    assert_eq!(summary.aggregated, 1);
    assert_eq!(requests(&backfill, "api"), 2);
    assert!(backfill.ledger().has("1-a"));
}

#[tokio::test]
async fn test_state_files_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "api", "/a", 200, 10.0));

    let mut collector = Collector::restore(&test_config(dir.path()), backend, Arc::new(HealthState::new()));
    collector.run_cycle_at(T0).await.unwrap();

    for file in ["ledger.json", "counters.json", "window.json"] {
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(file)).unwrap()).unwrap();
        assert_eq!(raw["version"], 1, "{file}");
    }
    let window: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("window.json")).unwrap()).unwrap();
    assert_eq!(window["data"]["last_end"], T0);
}

#[tokio::test]
async fn test_downstream_service_gets_its_own_requests_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let front = serde_json::json!({
        "id": "f1",
        "name": "front",
        "start_time": 1_000.0,
        "end_time": 1_000.5,
        "origin": "AWS::ECS::Container",
        "http": {"request": {"method": "GET", "url": "/checkout"}, "response": {"status": 200}},
        "subsegments": [{
            "id": "c1",
            "name": "orders",
            "namespace": "remote",
            "start_time": 1_000.1,
            "end_time": 1_000.4
        }]
    })
    .to_string();
    let orders = serde_json::json!({
        "id": "o1",
        "name": "orders",
        "parent_id": "c1",
        "start_time": 1_000.15,
        "end_time": 1_000.35,
        "origin": "AWS::ECS::Container",
        "error": true,
        "http": {"request": {"method": "POST", "url": "/orders"}, "response": {"status": 400}}
    })
    .to_string();
    let summary = decode_trace("1-chain", None, &[&front, &orders]).unwrap();
    assert!(!summary.has_error);

    let backend = ScriptedBackend::new();
    backend.add(summary);
    let mut collector = Collector::restore(&test_config(dir.path()), backend, Arc::new(HealthState::new()));
    collector.run_cycle_at(T0).await.unwrap();

    let snapshot = collector.snapshots().load_full();
    let services = &snapshot.counters.services;
    assert_eq!(services["front"].requests, 1);
    assert_eq!(services["front"].errors, 0);
    assert_eq!(services["orders"].requests, 1);
    assert_eq!(services["orders"].errors, 1);
    assert_eq!(services["orders"].methods["POST"], 1);
    // The call subsegment and the callee's document are one request.
    assert_eq!(services.len(), 2);
    // Only the entry request reaches the URL dimension.
    assert_eq!(snapshot.counters.urls.keys().collect::<Vec<_>>(), vec!["/checkout"]);
    assert_eq!(snapshot.counters.urls["/checkout"].errors, 0);

    let body = render(&snapshot).unwrap();
    assert_eq!(
        sample_value(&body, r#"xray_service_dependency_health{source="front",target="orders"}"#),
        Some(100.0)
    );
    assert_eq!(sample_value(&body, r#"xray_service_dependency_total{source="front",target="orders"}"#), Some(1.0));
    assert_eq!(sample_value(&body, r#"xray_service_errors_total{service="front"}"#), Some(0.0));
}
