//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → restore state → install self-metrics
//!     → bind listener → spawn collector + HTTP server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → collector flushes state
//!     → HTTP server drains → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: state is restored before the listener accepts scrapes
//! - The process runs until signalled; there is no other stop condition

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{run, run_with_backend, StartupError};
