//! Startup orchestration.
//!
//! # Responsibilities
//! - Capture the working directory relative paths resolve against
//! - Create the output directory
//! - Acquire the listener for the configured mode
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener comes last, so no request arrives before the store exists
//! - The process never changes its working directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::ingest::IngestStore;
use crate::net::{Listener, ListenerError};

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Unable to determine working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    #[error("Unable to create output directory {}: {source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Everything the server needs, acquired in order.
#[derive(Debug)]
pub struct Prepared {
    pub origin: PathBuf,
    pub store: Arc<IngestStore>,
    pub listener: Listener,
}

/// Prepare storage and the listener, resolving relative paths against the
/// current working directory.
pub async fn prepare(config: &IngestConfig) -> Result<Prepared, StartupError> {
    let origin = std::env::current_dir().map_err(StartupError::WorkingDirectory)?;
    prepare_in(config, &origin).await
}

/// Like [`prepare`], with an explicit origin directory.
pub async fn prepare_in(config: &IngestConfig, origin: &Path) -> Result<Prepared, StartupError> {
    let output = origin.join(&config.output.directory);
    let store = IngestStore::open(&output)
        .await
        .map_err(|source| StartupError::OutputDirectory {
            path: output.clone(),
            source,
        })?;

    let listener = Listener::acquire(&config.listener, origin).await?;

    Ok(Prepared {
        origin: origin.to_path_buf(),
        store: Arc::new(store),
        listener,
    })
}
