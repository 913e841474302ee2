//! Output directory and collision-free file creation.
//!
//! # Responsibilities
//! - Create the output directory once at startup
//! - Find the lowest unused sequence number for a (remote, path) pair
//! - Create the chosen file exclusively, owner-only permissions
//!
//! # Design Decisions
//! - One mutex per store serializes "probe names → create file"; nothing
//!   else happens under it, so body streaming never blocks allocation
//! - Probing restarts from zero on every call. Files deleted out-of-band
//!   free their numbers again
//! - `create_new` is the last line of defence against other processes
//!   writing into the same directory

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, DirBuilder, File, OpenOptions};
use tokio::sync::Mutex;

use crate::ingest::error::IngestError;
use crate::ingest::naming::DestinationName;

/// Mode of files created for request bodies.
const FILE_MODE: u32 = 0o600;

/// Mode of the output directory when we create it.
const DIRECTORY_MODE: u32 = 0o700;

/// A freshly created destination file, owned by one request.
#[derive(Debug)]
pub struct CreatedFile {
    pub name: DestinationName,
    pub path: PathBuf,
    pub file: File,
}

/// The output directory plus the lock guarding name allocation.
///
/// Shared between requests through an `Arc`; constructed once at startup.
#[derive(Debug)]
pub struct IngestStore {
    root: PathBuf,
    allocation: Mutex<()>,
}

impl IngestStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        DirBuilder::new()
            .recursive(true)
            .mode(DIRECTORY_MODE)
            .create(&root)
            .await?;

        tracing::debug!(directory = %root.display(), "Output directory ready");
        Ok(Self::new(root))
    }

    /// Wrap an existing directory without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allocation: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a name for `(remote, path)` and create its file.
    ///
    /// The allocation lock is held for the probe and the create only; it is
    /// released before this returns.
    pub async fn create(&self, remote: &str, path: &str) -> Result<CreatedFile, IngestError> {
        let _allocation = self.allocation.lock().await;

        let name = self.first_unused(remote, path).await?;
        let full_path = self.root.join(&name);

        let file = OpenOptions::new()
            .write(true)
            .append(true)
            .create_new(true)
            .mode(FILE_MODE)
            .open(&full_path)
            .await
            .map_err(|source| IngestError::Open {
                name: name.clone(),
                source,
            })?;

        Ok(CreatedFile {
            name,
            path: full_path,
            file,
        })
    }

    /// Linear probe from sequence zero.
    async fn first_unused(&self, remote: &str, path: &str) -> Result<DestinationName, IngestError> {
        for sequence in 0..=u64::MAX {
            let candidate = DestinationName::new(remote, path, sequence);
            match fs::symlink_metadata(self.root.join(&candidate)).await {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
                Err(source) => {
                    return Err(IngestError::Probe {
                        name: candidate,
                        source,
                    })
                }
            }
        }

        Err(IngestError::SequenceExhausted {
            remote: remote.to_string(),
            path: path.to_string(),
        })
    }
}
