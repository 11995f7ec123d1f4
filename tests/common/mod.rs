//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{extract::Json, http::StatusCode, http::Uri, Router};
use tokio::net::TcpListener;

use xray_exporter::backend::{
    BackendError, BackendResult, HttpInfo, SegmentRef, TimeWindow, TraceBackend, TraceSummary,
};
use xray_exporter::config::ExporterConfig;

/// Config with fast retries and state under `data_dir`.
pub fn test_config(data_dir: &Path) -> ExporterConfig {
    let mut config = ExporterConfig::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.fetcher.workers = 4;
    config.fetcher.batch_size = 5;
    config.retries.max_attempts = 2;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 2;
    config.collector.cycle_deadline_secs = Some(30);
    config.server.bind_address = "127.0.0.1:0".to_string();
    config
}

/// A single-segment trace served by `service`.
pub fn trace(id: &str, service: &str, url: &str, status: u16, duration_ms: f64) -> TraceSummary {
    let secs = duration_ms / 1000.0;
    TraceSummary {
        id: id.to_string(),
        start_time: Some(1_000.0),
        duration: Some(secs),
        response_time: Some(secs),
        has_error: (400..500).contains(&status),
        has_fault: status >= 500,
        has_throttle: status == 429,
        http: Some(HttpInfo {
            method: Some("GET".to_string()),
            url: Some(url.to_string()),
            status: Some(status),
            client_ip: Some("10.0.0.1".to_string()),
        }),
        segments: vec![SegmentRef {
            id: format!("{id}-root"),
            parent_id: None,
            service: service.to_string(),
            node_type: "AWS::EC2::Instance".to_string(),
            start_time: Some(1_000.0),
            end_time: Some(1_000.0 + secs),
            error: (400..500).contains(&status),
            fault: status >= 500,
            throttle: status == 429,
            ..SegmentRef::default()
        }],
    }
}

/// In-memory backend whose listing, detail and failures are scripted per test.
#[derive(Default)]
pub struct ScriptedBackend {
    listing: Mutex<Vec<String>>,
    traces: Mutex<HashMap<String, Vec<TraceSummary>>>,
    failing: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `trace` available and list its id in the next windows.
    pub fn add(&self, trace: TraceSummary) {
        self.listing.lock().unwrap().push(trace.id.clone());
        self.traces.lock().unwrap().entry(trace.id.clone()).or_default().push(trace);
    }

    /// Serve `trace` for its id without touching the listing.
    pub fn replace(&self, trace: TraceSummary) {
        self.traces.lock().unwrap().insert(trace.id.clone(), vec![trace]);
    }

    /// Only list these ids from now on (the traces stay fetchable).
    pub fn set_listing(&self, ids: &[&str]) {
        *self.listing.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }

    /// Any batch containing `id` fails with a retryable error.
    pub fn fail_batches_with(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.fail_listing.store(false, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TraceBackend for ScriptedBackend {
    async fn list_trace_ids(&self, _window: TimeWindow) -> BackendResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BackendError::Http {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn get_trace_detail(&self, ids: &[String]) -> BackendResult<Vec<TraceSummary>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.lock().unwrap();
        if ids.iter().any(|id| failing.contains(id)) {
            return Err(BackendError::Throttled);
        }
        let traces = self.traces.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| traces.get(id))
            .flatten()
            .cloned()
            .collect())
    }
}

/// Start a programmable mock of the backend's JSON API on an ephemeral port.
///
/// `f` receives the request path and JSON body and returns status and JSON body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, serde_json::Value)> + Send + 'static,
{
    let f = Arc::new(f);
    let app = Router::new().fallback(move |uri: Uri, Json(body): Json<serde_json::Value>| {
        let f = f.clone();
        async move {
            let (status, body) = f(uri.path().to_string(), body).await;
            (StatusCode::from_u16(status).unwrap(), Json(body))
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A raw segment document as the backend stores it.
pub fn segment_document(id: &str, name: &str, start: f64, end: f64, status: u16) -> String {
    serde_json::json!({
        "id": id,
        "name": name,
        "start_time": start,
        "end_time": end,
        "origin": "AWS::ECS::Container",
        "http": {
            "request": {"method": "GET", "url": "https://shop.example.com/", "client_ip": "10.0.0.7"},
            "response": {"status": status}
        }
    })
    .to_string()
}

/// Extract the value of one exposition line, e.g. `xray_service_requests_total{service="api"}`.
pub fn sample_value(body: &str, series: &str) -> Option<f64> {
    body.lines()
        .find_map(|line| line.strip_prefix(series)?.strip_prefix(' '))
        .and_then(|v| v.parse().ok())
}
