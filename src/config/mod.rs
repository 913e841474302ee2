//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (cli.rs)
//!     → validation.rs (semantic checks)
//!     → IngestConfig (validated, immutable)
//!     → consumed once by startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    IngestConfig, LifecycleConfig, ListenerConfig, LogFormat, ObservabilityConfig, OutputConfig,
    TlsConfig, TransportMode,
};
pub use validation::ValidationError;
