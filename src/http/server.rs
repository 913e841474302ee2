//! Router construction and the accept loop.
//!
//! # Responsibilities
//! - Build the axum Router shared by every transport
//! - Accept connections and hand each one to its own task
//! - Serve HTTP/1.1 and HTTP/2 connections through hyper
//! - Hand gateway connections to the FastCGI responder
//! - Stop accepting on shutdown and drain in-flight connections
//!
//! # Design Decisions
//! - The remote endpoint is attached per connection, before routing, so the
//!   handler never depends on how the connection arrived
//! - No per-request timeout and no body limit: uploads may be arbitrarily
//!   large and slow

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::any;
use axum::Router;
use hyper::body::Incoming as IncomingBody;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::sync::broadcast;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::IngestConfig;
use crate::gateway::Responder;
use crate::http::request::{RemoteEndpoint, UuidRequestId};
use crate::ingest::{ingest, IngestState, IngestStore};
use crate::net::connection::IoStream;
use crate::net::{Connection, ConnectionTracker, Incoming, Listener};
use crate::observability::metrics;

/// Pause after a failed accept, so descriptor exhaustion does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Build the router every transport dispatches into.
pub fn build_router(state: IngestState) -> Router {
    Router::new()
        .route("/", any(ingest))
        .route("/{*path}", any(ingest))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// The ingest server: one router, any transport.
#[derive(Debug)]
pub struct IngestServer {
    router: Router,
    shutdown_grace: Duration,
    tracker: ConnectionTracker,
}

impl IngestServer {
    pub fn new(config: &IngestConfig, store: Arc<IngestStore>) -> Self {
        let state = IngestState {
            store,
            sync_on_complete: config.output.sync_on_complete,
        };

        Self {
            router: build_router(state),
            shutdown_grace: Duration::from_secs(config.lifecycle.shutdown_grace_secs),
            tracker: ConnectionTracker::new(),
        }
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Serve `listener` until `shutdown` fires, then close it and wait for
    /// in-flight connections (up to the grace period).
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            mode = %listener.mode(),
            address = %listener.local_addr(),
            "Listening for requests"
        );

        let responder = Responder::new(self.router.clone(), listener.max_connections());

        loop {
            let (incoming, permit) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
            };

            let guard = self.tracker.track();
            let router = self.router.clone();
            let responder = responder.clone();
            let conn_shutdown = shutdown.resubscribe();

            tokio::spawn(async move {
                let _permit = permit;
                let transport = incoming.transport();
                let span = tracing::debug_span!(
                    "connection",
                    id = %guard.id(),
                    transport,
                    peer = ?incoming.peer()
                );

                metrics::connection_opened(transport);
                serve_incoming(incoming, router, responder, conn_shutdown)
                    .instrument(span)
                    .await;
                metrics::connection_closed(transport);
                drop(guard);
            });
        }

        listener.close();

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, "Waiting for connections to drain");
        }
        if !self.tracker.wait_for_drain(self.shutdown_grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                grace_secs = self.shutdown_grace.as_secs(),
                "Grace period elapsed with connections still open"
            );
        }
    }
}

async fn serve_incoming(
    incoming: Incoming,
    router: Router,
    responder: Responder,
    shutdown: broadcast::Receiver<()>,
) {
    let connection = match incoming.establish().await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::debug!(error = %e, "Connection setup failed");
            return;
        }
    };

    match connection {
        Connection::Http { io, peer } => serve_http(io, peer, router, shutdown).await,
        Connection::Gateway(stream) => {
            if let Err(e) = responder.serve(stream, shutdown).await {
                tracing::warn!(error = %e, "Gateway connection failed");
            }
        }
    }
}

async fn serve_http(
    io: Box<dyn IoStream>,
    peer: SocketAddr,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) {
    let remote = RemoteEndpoint::from(peer);
    let service = hyper::service::service_fn(move |mut request: Request<IncomingBody>| {
        request.extensions_mut().insert(remote.clone());
        router.clone().oneshot(request)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "HTTP connection ended with error");
    }
}
