//! HTTP exposition subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout + trace layers)
//!     → handlers.rs
//!         GET /metrics → latest snapshot → exposition::render (+ self-metrics)
//!         GET /health  → last cycle health
//!         GET /        → info page
//!         anything else → 404
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
