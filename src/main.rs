//! POST ingest server.
//!
//! Accepts requests over HTTPS, plaintext HTTP or FastCGI and writes each
//! POST body to a new file named after the client and the request path.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client / front-end server
//!     ─────────────────────────┐
//!                              ▼
//!                     ┌──────────────────┐
//!                     │       net        │  tls | plaintext | gateway
//!                     │ listener + conns │
//!                     └────────┬─────────┘
//!                  HTTP/1.1, h2│        │FastCGI records
//!                              ▼        ▼
//!                     ┌──────────┐  ┌─────────┐
//!                     │   http   │  │ gateway │
//!                     │  server  │  │responder│
//!                     └────┬─────┘  └────┬────┘
//!                          └─────┬───────┘
//!                                ▼
//!                       ┌─────────────────┐
//!                       │ Router → ingest │  allocation lock, exclusive create,
//!                       │     handler     │  streamed body copy
//!                       └─────────────────┘
//! ```

use clap::Parser;

use post_ingest::cli::Cli;
use post_ingest::http::IngestServer;
use post_ingest::lifecycle::{self, Shutdown};
use post_ingest::observability::{init_logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "post-ingest starting");

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let prepared = lifecycle::prepare(&config).await?;
    tracing::info!(
        directory = %prepared.store.root().display(),
        mode = %config.listener.mode,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signals = lifecycle::spawn_signal_listener(shutdown.clone());

    let server = IngestServer::new(&config, prepared.store);
    server.run(prepared.listener, shutdown.subscribe()).await;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
