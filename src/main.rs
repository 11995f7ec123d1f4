//! X-Ray Prometheus Exporter
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────────┐
//!                    │                      XRAY EXPORTER                        │
//!                    │                                                           │
//!   Tracing backend  │  ┌──────────┐   ┌───────────┐   ┌────────────┐            │
//!  ◀─────────────────┼──│ backend  │◀──│  fetcher  │◀──│   driver   │ (interval) │
//!   /TraceSummaries  │  │  client  │   │  workers  │   │            │            │
//!   /Traces          │  └──────────┘   └─────┬─────┘   └─────┬──────┘            │
//!                    │                       ▼               │                   │
//!                    │                 ┌───────────┐   ┌─────▼──────┐            │
//!                    │                 │ processor │──▶│ aggregator │──▶ storage │
//!                    │                 └───────────┘   │  + ledger  │   (JSON)   │
//!                    │                                 └─────┬──────┘            │
//!                    │                                       ▼ ArcSwap publish   │
//!   Prometheus       │  ┌─────────┐   ┌─────────────┐  ┌────────────┐           │
//!  ──────────────────┼─▶│  http   │──▶│ exposition  │◀─│  snapshot  │           │
//!   GET /metrics     │  │ server  │   │   render    │  └────────────┘           │
//!                    │  └─────────┘   └─────────────┘                           │
//!                    └───────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use xray_exporter::config::Cli;
use xray_exporter::lifecycle::{self, wait_for_signal};
use xray_exporter::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "xray-exporter starting");
    tracing::info!(
        endpoint = %config.backend.endpoint,
        bind_address = %config.server.bind_address,
        interval_secs = config.collector.interval_secs,
        workers = config.fetcher.workers,
        batch_size = config.fetcher.batch_size,
        data_dir = %config.storage.data_dir.display(),
        force_full_collection = config.collector.force_full_collection,
        "Configuration loaded"
    );

    lifecycle::run(config, wait_for_signal()).await?;
    Ok(())
}
