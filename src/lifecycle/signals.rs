//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT or SIGTERM
//! - Translate the first one into a shutdown broadcast
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A signal ends the process cleanly; exit status is 0

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Resolve when SIGINT or SIGTERM arrives.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Spawn a task that triggers `shutdown` on the first signal.
///
/// If handlers cannot be installed the error is logged and shutdown is
/// triggered immediately rather than running unstoppable.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => tracing::info!(signal = name, "Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Unable to install signal handlers"),
        }
        shutdown.trigger();
    })
}
