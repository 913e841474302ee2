//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS/TCP connection                      FastCGI gateway request
//!     → server.rs (hyper, HTTP/1.1 + h2)      → gateway::responder
//!     → RemoteEndpoint extension                → RemoteEndpoint extension
//!                     ↘                      ↙
//!                      Router (request ID, trace)
//!                      → ingest::handler
//!                      → response.rs (status + plain-text literal)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RemoteEndpoint, RequestSummary, X_REQUEST_ID};
pub use response::IngestResponse;
pub use server::{build_router, IngestServer};
