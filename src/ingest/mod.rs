//! Ingest subsystem.
//!
//! # Data Flow
//! ```text
//! Request (any transport)
//!     → handler.rs (method check, outcome logging)
//!     → store.rs (allocation lock: probe names, exclusive create)
//!         → naming.rs (remote + flattened path + sequence)
//!     → transfer.rs (stream body into the file, outside the lock)
//!     → IngestResponse (byte count or short error tag)
//! ```
//!
//! # Design Decisions
//! - The allocation lock lives in `IngestStore` and is passed in through
//!   handler state, never held in a global
//! - Partial files from failed transfers are left in place

pub mod error;
pub mod handler;
pub mod naming;
pub mod store;
pub mod transfer;

pub use error::{IngestError, TransferError};
pub use handler::{ingest, IngestState};
pub use naming::DestinationName;
pub use store::{CreatedFile, IngestStore};
