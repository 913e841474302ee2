//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingest_requests_total` (counter): requests by terminal outcome
//! - `ingest_request_duration_seconds` (histogram): time to terminal outcome
//! - `ingest_bytes_written_total` (counter): body bytes stored
//! - `ingest_active_connections` (gauge): open connections by transport
//!
//! # Design Decisions
//! - Recording is always on; without an installed exporter the `metrics`
//!   facade discards updates
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Terminal state of one ingest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Rejected,
    OpenFailed,
    Failed,
    Completed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Rejected => "rejected",
            Outcome::OpenFailed => "open_failed",
            Outcome::Failed => "failed",
            Outcome::Completed => "completed",
        }
    }
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a terminal request outcome.
pub fn record_outcome(outcome: Outcome, started: Instant) {
    let label = outcome.as_str();
    counter!("ingest_requests_total", "outcome" => label).increment(1);
    histogram!("ingest_request_duration_seconds", "outcome" => label)
        .record(started.elapsed().as_secs_f64());
}

/// Record body bytes that reached a file, including partial transfers.
pub fn record_bytes(bytes: u64) {
    counter!("ingest_bytes_written_total").increment(bytes);
}

pub fn connection_opened(transport: &'static str) {
    gauge!("ingest_active_connections", "transport" => transport).increment(1.0);
}

pub fn connection_closed(transport: &'static str) {
    gauge!("ingest_active_connections", "transport" => transport).decrement(1.0);
}
