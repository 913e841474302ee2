//! Gateway socket file management.
//!
//! # Responsibilities
//! - Resolve relative socket paths against the startup working directory
//! - Remove a stale socket left behind by a previous run
//! - Remove the socket file when the listener goes away
//!
//! # Design Decisions
//! - Only sockets are ever removed; any other file at the path is an error
//! - Removal is tied to `Drop`, so every exit path that unwinds the listener
//!   (signal-driven shutdown, normal close, panic) cleans up

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;

/// Absolute socket path: `address` as-is if absolute, else joined onto `origin`.
pub fn resolve_socket_path(origin: &Path, address: &str) -> PathBuf {
    let path = Path::new(address);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        origin.join(path)
    }
}

/// A bound Unix listener whose socket file is removed on drop.
#[derive(Debug)]
pub struct SocketFile {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketFile {
    /// Remove any stale socket at `path` and bind a fresh one.
    pub fn bind(path: PathBuf) -> io::Result<Self> {
        remove_stale(&path)?;

        let listener = UnixListener::bind(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("failed to bind to {}: {e}", path.display()))
        })?;

        Ok(Self { path, listener })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn listener(&self) -> &UnixListener {
        &self.listener
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(socket_path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                socket_path = %self.path.display(),
                error = %e,
                "Failed to remove socket file"
            ),
        }
    }
}

fn remove_stale(path: &Path) -> io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(io::Error::new(
                e.kind(),
                format!("failed to stat {}: {e}", path.display()),
            ))
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("path {} exists but is not a socket", path.display()),
        ));
    }

    std::fs::remove_file(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("failed to remove stale socket {}: {e}", path.display()),
        )
    })?;
    tracing::debug!(path = %path.display(), "Removed stale socket file");
    Ok(())
}
