//! POST ingest server library.

pub mod cli;
pub mod config;
pub mod gateway;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::IngestConfig;
pub use http::IngestServer;
pub use lifecycle::Shutdown;
