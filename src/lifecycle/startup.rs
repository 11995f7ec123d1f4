//! Startup orchestration.
//!
//! # Responsibilities
//! - Restore persisted state and build the collector
//! - Install the self-metrics recorder
//! - Bind the exposition listener and start both long-running tasks
//! - Stop both tasks on shutdown, collector first so state is flushed
//!
//! # Design Decisions
//! - Fail fast: a bind or client setup error is fatal
//! - Listeners start last (scrapes only once restored state is published)

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::backend::{BackendError, HttpTraceBackend, TraceBackend};
use crate::config::ExporterConfig;
use crate::health::HealthState;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::Collector;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to set up trace backend client: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Run the exporter against the configured HTTP backend until `stop` resolves.
pub async fn run(config: ExporterConfig, stop: impl Future<Output = ()>) -> Result<(), StartupError> {
    let backend = HttpTraceBackend::new(&config.backend, config.fetcher.request_timeout())?;
    run_with_backend(config, Arc::new(backend), stop).await
}

/// Run with any backend implementation.
pub async fn run_with_backend(
    config: ExporterConfig,
    backend: Arc<dyn TraceBackend>,
    stop: impl Future<Output = ()>,
) -> Result<(), StartupError> {
    let health = Arc::new(HealthState::new());
    let collector = Collector::restore(&config, backend, Arc::clone(&health));

    let self_metrics = if config.observability.self_metrics_enabled {
        metrics::init_metrics()
    } else {
        None
    };

    let state = AppState {
        snapshots: collector.snapshots(),
        health,
        self_metrics,
    };

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.server.bind_address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    let collector_task = tokio::spawn(collector.run(shutdown.subscribe()));
    let server_task = tokio::spawn(HttpServer::new(&config.server, state).run(listener, shutdown.subscribe()));

    stop.await;
    let tasks = shutdown.trigger();
    tracing::info!(tasks, "Shutting down");

    if let Err(e) = collector_task.await {
        tracing::error!(error = %e, "Collector task panicked");
    }
    match server_task.await {
        Ok(result) => result.map_err(StartupError::Server)?,
        Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
