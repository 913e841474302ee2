//! The ingest request handler.
//!
//! # Responsibilities
//! - Reject anything but `POST`
//! - Allocate and exclusively create the destination file
//! - Stream the body into it outside the allocation lock
//! - Log every terminal outcome exactly once
//!
//! ```text
//! Received → MethodChecked ─┬─ Rejected
//!                           └─ NameAllocated ─┬─ OpenFailed
//!                                             └─ FileOpened → Streaming ─┬─ Completed
//!                                                                        └─ Failed
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::Extension;
use percent_encoding::percent_decode_str;
use tracing::Instrument;

use crate::http::request::{RemoteEndpoint, RequestSummary};
use crate::http::response::IngestResponse;
use crate::ingest::store::IngestStore;
use crate::observability::metrics::{self, Outcome};

/// Shared state injected into the handler.
#[derive(Debug, Clone)]
pub struct IngestState {
    pub store: Arc<IngestStore>,
    /// `fsync` each file before reporting success.
    pub sync_on_complete: bool,
}

/// Axum handler for every path and method.
pub async fn ingest(
    State(state): State<IngestState>,
    Extension(remote): Extension<RemoteEndpoint>,
    request: Request<Body>,
) -> IngestResponse {
    let (parts, body) = request.into_parts();
    let summary = RequestSummary::new(&remote, &parts);
    let span = summary.span();

    let path = decoded_path(parts.uri.path());

    // Detached, so a connection torn down mid-body still reaches an outcome.
    let task = tokio::spawn(process(state, remote, parts.method, path, body).instrument(span));
    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Ingest task failed");
            IngestResponse::WriteFailed
        }
    }
}

/// Percent-decode the URI path; invalid UTF-8 becomes U+FFFD and malformed
/// escapes are kept literally.
fn decoded_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

async fn process(
    state: IngestState,
    remote: RemoteEndpoint,
    method: Method,
    path: String,
    body: Body,
) -> IngestResponse {
    let started = Instant::now();

    if method != Method::POST {
        tracing::warn!("Invalid method");
        metrics::record_outcome(Outcome::Rejected, started);
        return IngestResponse::InvalidMethod;
    }

    let mut created = match state.store.create(remote.as_str(), &path).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(error = %e, "Unable to open file");
            metrics::record_outcome(Outcome::OpenFailed, started);
            return IngestResponse::OpenFailed;
        }
    };

    let result = crate::ingest::transfer::copy_body(
        body.into_data_stream(),
        &mut created.file,
        state.sync_on_complete,
    )
    .await;
    drop(created.file);

    match result {
        Ok(bytes) => {
            tracing::info!(bytes, file = %created.name, "Wrote body");
            metrics::record_bytes(bytes);
            metrics::record_outcome(Outcome::Completed, started);
            IngestResponse::Written(bytes)
        }
        Err(e) => {
            tracing::error!(
                bytes = e.written(),
                file = %created.name,
                error = %e,
                "Transfer failed"
            );
            metrics::record_bytes(e.written());
            metrics::record_outcome(Outcome::Failed, started);
            IngestResponse::WriteFailed
        }
    }
}
