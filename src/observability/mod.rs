//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connections and requests produce:
//!     → logging.rs (structured log events, one per request outcome)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all log lines of a request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
