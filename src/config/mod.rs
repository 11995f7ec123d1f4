//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (command-line overrides)
//!     → validation.rs (semantic checks)
//!     → ExporterConfig (validated, immutable)
//!     → handed to the driver, fetcher and HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Invalid configuration is fatal at startup, never later

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::{
    AggregationConfig, BackendConfig, CollectorConfig, ExporterConfig, FetcherConfig, LedgerConfig,
    ObservabilityConfig, RetryConfig, ServerConfig, StorageConfig,
};
pub use validation::{validate_config, ValidationError};
