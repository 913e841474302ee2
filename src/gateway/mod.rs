//! FastCGI gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Unix socket connection (from the front-end web server)
//!     → record.rs (frame decoding)
//!     → responder.rs (BEGIN_REQUEST, PARAMS, management records)
//!         → params.rs (CGI variables → http::Request)
//!         → shared Router (same handler as HTTP)
//!         ← STDIN records streamed into the request body
//!     ← STDOUT (CGI response) + END_REQUEST
//! ```
//!
//! # Design Decisions
//! - Only the responder role is served
//! - One request at a time per connection; multiplexed requests are refused
//!   with CANT_MPX_CONN
//! - Body bytes flow through a bounded channel, so a slow disk slows the
//!   front-end instead of buffering in memory

pub mod params;
pub mod record;
pub mod responder;

pub use responder::Responder;

/// Error type for gateway connections.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gateway protocol error: {0}")]
    Protocol(String),
}
