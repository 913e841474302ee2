//! Network layer subsystem (transport selection).
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs (mode: tls | plaintext | gateway)
//!         → tls.rs (load keypair)         [tls]
//!         → socket.rs (stale socket, path) [gateway]
//!
//! Per connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (TLS handshake, lifecycle tracking)
//!     → Hand off to the HTTP server or the FastCGI responder
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is handled transparently; the request path never sees it

pub mod connection;
pub mod listener;
pub mod socket;
pub mod tls;

pub use connection::{Connection, ConnectionTracker, Incoming};
pub use listener::{BoundAddress, Listener, ListenerError};
