//! Whole-process run: startup, one collection cycle, graceful stop.

use std::sync::atomic::Ordering;
use std::time::Duration;

use xray_exporter::lifecycle::run_with_backend;

mod common;
use common::{test_config, trace, ScriptedBackend};

#[tokio::test]
async fn test_run_collects_and_flushes_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new();
    backend.add(trace("1-a", "api", "/a", 200, 10.0));

    let config = test_config(dir.path());
    run_with_backend(config, backend.clone(), tokio::time::sleep(Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("counters.json")).unwrap()).unwrap();
    assert_eq!(raw["kind"], "counters");
    assert_eq!(raw["data"]["services"]["api"]["requests"], 1);
    assert_eq!(raw["data"]["heartbeat"], 1);
    assert!(dir.path().join("ledger.json").exists());
}

#[tokio::test]
async fn test_unusable_bind_address_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.server.bind_address = "256.0.0.1:80".to_string();

    let err = run_with_backend(config, ScriptedBackend::new(), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("256.0.0.1:80"));
}
