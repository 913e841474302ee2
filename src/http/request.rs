//! Request metadata shared by every transport.
//!
//! # Responsibilities
//! - Carry the remote endpoint from the connection into the handler
//! - Generate a request ID for each request
//! - Summarize a request for outcome logging
//!
//! # Design Decisions
//! - The remote endpoint is a plain string: TCP peers render as `ip:port`,
//!   gateway peers come from `REMOTE_ADDR`/`REMOTE_PORT` and may be anything
//! - HTTP/2 requests carry the host in the URI authority, not a header

use std::fmt;
use std::net::SocketAddr;

use axum::http::{header, request::Parts, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Identifier of the client that sent a request, as seen by this process.
///
/// Inserted as a request extension by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint(String);

impl RemoteEndpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for RemoteEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// The request fields every outcome log line carries.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub remote: String,
    pub method: String,
    pub uri: String,
    pub proto: String,
    pub host: String,
    pub user_agent: String,
    pub request_id: String,
}

impl RequestSummary {
    pub fn new(remote: &RemoteEndpoint, parts: &Parts) -> Self {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let host = header_str(header::HOST.as_str())
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        Self {
            remote: remote.to_string(),
            method: parts.method.to_string(),
            uri: parts.uri.to_string(),
            proto: format!("{:?}", parts.version),
            host,
            user_agent: header_str(header::USER_AGENT.as_str()).unwrap_or_default(),
            request_id: header_str(X_REQUEST_ID).unwrap_or_default(),
        }
    }

    /// Span wrapping the handling of this request.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "ingest",
            request_id = %self.request_id,
            remote = %self.remote,
            method = %self.method,
            uri = %self.uri,
            proto = %self.proto,
            host = ?self.host,
            user_agent = ?self.user_agent,
        )
    }
}
