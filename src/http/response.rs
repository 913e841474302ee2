//! Response mapping for ingest outcomes.
//!
//! # Responsibilities
//! - Map each terminal outcome to a status code and short plain-text body
//! - Never expose filesystem detail to the client
//!
//! # Design Decisions
//! - Bodies are bare literals without a trailing newline
//! - Plain-text responses are marked `nosniff`

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Terminal outcome of an ingest request as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResponse {
    /// Body stored; carries the byte count.
    Written(u64),
    /// Not the write method.
    InvalidMethod,
    /// Name allocation or exclusive create failed.
    OpenFailed,
    /// Body transfer failed.
    WriteFailed,
    /// The gateway could not turn its parameters into a request.
    BadRequest,
}

impl IngestResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestResponse::Written(_) => StatusCode::OK,
            IngestResponse::InvalidMethod => StatusCode::METHOD_NOT_ALLOWED,
            IngestResponse::OpenFailed | IngestResponse::WriteFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            IngestResponse::BadRequest => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(&self) -> String {
        match self {
            IngestResponse::Written(n) => n.to_string(),
            IngestResponse::InvalidMethod => "Invalid method".to_string(),
            IngestResponse::OpenFailed => "open".to_string(),
            IngestResponse::WriteFailed => "write".to_string(),
            IngestResponse::BadRequest => "Bad request".to_string(),
        }
    }
}

impl IntoResponse for IngestResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.body()).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        if self == IngestResponse::InvalidMethod {
            headers.insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}
