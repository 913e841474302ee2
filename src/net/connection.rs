//! Connection establishment and lifecycle tracking.
//!
//! # Responsibilities
//! - Finish protocol setup for an accepted socket (TLS handshake)
//! - Generate unique connection IDs for tracing
//! - Count live connections so shutdown can wait for them to drain
//!
//! # Design Decisions
//! - Handshakes run on the connection's own task, never in the accept loop
//! - HTTP streams are type-erased so TLS and plaintext share one code path

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Notify;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Byte stream carrying HTTP, encrypted or not.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> IoStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A socket fresh out of `accept()`, before any protocol setup.
pub enum Incoming {
    Tls {
        stream: TcpStream,
        peer: SocketAddr,
        acceptor: RustlsAcceptor,
    },
    Plain {
        stream: TcpStream,
        peer: SocketAddr,
    },
    Gateway {
        stream: UnixStream,
    },
}

impl Incoming {
    /// Transport label for logs and metrics.
    pub fn transport(&self) -> &'static str {
        match self {
            Incoming::Tls { .. } => "tls",
            Incoming::Plain { .. } => "plaintext",
            Incoming::Gateway { .. } => "gateway",
        }
    }

    /// Peer address of TCP connections.
    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            Incoming::Tls { peer, .. } | Incoming::Plain { peer, .. } => Some(*peer),
            Incoming::Gateway { .. } => None,
        }
    }

    /// Complete protocol setup. For TLS this performs the handshake.
    pub async fn establish(self) -> std::io::Result<Connection> {
        match self {
            Incoming::Tls {
                stream,
                peer,
                acceptor,
            } => {
                let (stream, ()) = acceptor.accept(stream, ()).await?;
                Ok(Connection::Http {
                    io: Box::new(stream),
                    peer,
                })
            }
            Incoming::Plain { stream, peer } => Ok(Connection::Http {
                io: Box::new(stream),
                peer,
            }),
            Incoming::Gateway { stream } => Ok(Connection::Gateway(stream)),
        }
    }
}

impl std::fmt::Debug for Incoming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Incoming")
            .field("transport", &self.transport())
            .field("peer", &self.peer())
            .finish_non_exhaustive()
    }
}

/// An established connection ready for request decoding.
pub enum Connection {
    /// Speaks HTTP/1.1 or HTTP/2 directly.
    Http { io: Box<dyn IoStream>, peer: SocketAddr },
    /// Speaks FastCGI to a front-end server.
    Gateway(UnixStream),
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active_count: AtomicU64,
    drained: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.inner.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.inner.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or `timeout` passes.
    ///
    /// Returns `true` if everything drained in time.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.inner.drained.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.active_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn drain_completes_when_last_guard_drops() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_drain(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn drain_times_out_while_connections_remain() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.track();
        assert!(!tracker.wait_for_drain(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn plaintext_establish_keeps_peer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (stream, peer) = listener.accept().await.unwrap();
        let _client = client.await.unwrap();

        let incoming = Incoming::Plain { stream, peer };
        assert_eq!(incoming.transport(), "plaintext");
        match incoming.establish().await.unwrap() {
            Connection::Http { peer: established, .. } => assert_eq!(established, peer),
            Connection::Gateway(_) => panic!("expected an HTTP connection"),
        }
    }
}
