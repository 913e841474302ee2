//! Per-request ingest errors.
//!
//! None of these are fatal to the process. The handler reports them to the
//! client as a short tag and logs the detail.

use std::io;

use crate::ingest::naming::DestinationName;

/// Boxed error produced by a request body stream.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while allocating and creating the destination file.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Checking whether a candidate name exists failed for a reason other
    /// than "not found".
    #[error("failed to probe {name}: {source}")]
    Probe {
        name: DestinationName,
        #[source]
        source: io::Error,
    },

    /// The exclusive create of the chosen name failed.
    #[error("failed to create {name}: {source}")]
    Open {
        name: DestinationName,
        #[source]
        source: io::Error,
    },

    /// Every sequence number for this (remote, path) pair is taken.
    #[error("sequence space exhausted for {remote} {path}")]
    SequenceExhausted { remote: String, path: String },
}

/// Failure while streaming a request body into its file.
///
/// Every variant records how many bytes reached the file before the failure.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Reading the request body failed (includes client disconnects).
    #[error("body read failed after {written} bytes: {source}")]
    Read {
        written: u64,
        #[source]
        source: BoxError,
    },

    /// Writing to the destination file failed.
    #[error("file write failed after {written} bytes: {source}")]
    Write {
        written: u64,
        #[source]
        source: io::Error,
    },

    /// Syncing the completed file to stable storage failed.
    #[error("file sync failed after {written} bytes: {source}")]
    Sync {
        written: u64,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Bytes written before the failure.
    pub fn written(&self) -> u64 {
        match self {
            TransferError::Read { written, .. }
            | TransferError::Write { written, .. }
            | TransferError::Sync { written, .. } => *written,
        }
    }
}
