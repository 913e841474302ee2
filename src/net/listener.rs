//! Listener acquisition for the three transport modes.
//!
//! # Responsibilities
//! - Load credentials (TLS) or prepare the socket file (gateway)
//! - Bind the configured address or path
//! - Accept connections, enforcing max_connections via semaphore
//!
//! # Design Decisions
//! - One `Listener` type for every mode; callers never branch on the mode
//! - Any failure here happens at startup and is fatal
//! - Accept errors are returned to the caller, which decides whether to go on

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::config::{ListenerConfig, TransportMode};
use crate::net::connection::Incoming;
use crate::net::socket::{resolve_socket_path, SocketFile};
use crate::net::tls::load_tls_config;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Certificate or key could not be loaded.
    #[error("Unable to load keypair from {cert} and {key}: {source}")]
    Credential {
        cert: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind a TCP address.
    #[error("Unable to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to prepare or bind the gateway socket.
    #[error("Unable to listen on {}: {source}", .path.display())]
    Socket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
}

/// Where a listener is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddress::Tcp(addr) => write!(f, "{}", addr),
            BoundAddress::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

enum Transport {
    Tls {
        inner: TcpListener,
        tls: RustlsConfig,
        handshake_timeout: Duration,
    },
    Plain {
        inner: TcpListener,
    },
    Gateway {
        socket: SocketFile,
    },
}

/// A bound listener of any mode, with a connection limit.
///
/// Dropping the listener closes it; in gateway mode that also removes the
/// socket file.
pub struct Listener {
    transport: Transport,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind according to `config`.
    ///
    /// `origin` is the directory relative credential and socket paths
    /// resolve against.
    pub async fn acquire(config: &ListenerConfig, origin: &Path) -> Result<Self, ListenerError> {
        let transport = match config.mode {
            TransportMode::Tls => {
                let cert = origin.join(&config.tls.cert_path);
                let key = origin.join(&config.tls.key_path);
                let tls = load_tls_config(&cert, &key).await.map_err(|source| {
                    ListenerError::Credential {
                        cert: config.tls.cert_path.clone(),
                        key: config.tls.key_path.clone(),
                        source,
                    }
                })?;
                tracing::info!(
                    cert = %config.tls.cert_path,
                    key = %config.tls.key_path,
                    "Loaded keypair"
                );

                Transport::Tls {
                    inner: bind_tcp(&config.address).await?,
                    tls,
                    handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
                }
            }
            TransportMode::Plaintext => Transport::Plain {
                inner: bind_tcp(&config.address).await?,
            },
            TransportMode::Gateway => {
                let path = resolve_socket_path(origin, &config.address);
                let socket = SocketFile::bind(path.clone())
                    .map_err(|source| ListenerError::Socket { path, source })?;
                Transport::Gateway { socket }
            }
        };

        let listener = Self {
            transport,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        };

        tracing::info!(
            mode = %listener.mode(),
            address = %listener.local_addr(),
            max_connections = listener.max_connections,
            "Listener bound"
        );

        Ok(listener)
    }

    pub fn mode(&self) -> TransportMode {
        match self.transport {
            Transport::Tls { .. } => TransportMode::Tls,
            Transport::Plain { .. } => TransportMode::Plaintext,
            Transport::Gateway { .. } => TransportMode::Gateway,
        }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the connection and a permit that must be held for its lifetime.
    pub async fn accept(&self) -> Result<(Incoming, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Accept(std::io::Error::other("connection limit closed")))?;

        let incoming = match &self.transport {
            Transport::Tls {
                inner,
                tls,
                handshake_timeout,
            } => {
                let (stream, peer) = inner.accept().await.map_err(ListenerError::Accept)?;
                let acceptor = RustlsAcceptor::new(tls.clone()).handshake_timeout(*handshake_timeout);
                Incoming::Tls {
                    stream,
                    peer,
                    acceptor,
                }
            }
            Transport::Plain { inner } => {
                let (stream, peer) = inner.accept().await.map_err(ListenerError::Accept)?;
                Incoming::Plain { stream, peer }
            }
            Transport::Gateway { socket } => {
                let (stream, _) = socket
                    .listener()
                    .accept()
                    .await
                    .map_err(ListenerError::Accept)?;
                Incoming::Gateway { stream }
            }
        };

        tracing::debug!(
            transport = incoming.transport(),
            peer = ?incoming.peer(),
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((incoming, ConnectionPermit { _permit: permit }))
    }

    /// The address or socket path this listener is bound to.
    pub fn local_addr(&self) -> BoundAddress {
        match &self.transport {
            Transport::Tls { inner, .. } | Transport::Plain { inner } => inner
                .local_addr()
                .map(BoundAddress::Tcp)
                .unwrap_or_else(|_| BoundAddress::Tcp(SocketAddr::from(([0, 0, 0, 0], 0)))),
            Transport::Gateway { socket } => BoundAddress::Unix(socket.path().to_path_buf()),
        }
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Stop listening. Connections already accepted are unaffected.
    pub fn close(self) {
        tracing::info!(address = %self.local_addr(), "Listener closed");
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("mode", &self.mode())
            .field("address", &self.local_addr())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// A bare `:port` means every IPv4 interface.
fn bind_target(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => address.to_string(),
    }
}

async fn bind_tcp(address: &str) -> Result<TcpListener, ListenerError> {
    TcpListener::bind(bind_target(address))
        .await
        .map_err(|source| ListenerError::Bind {
            address: address.to_string(),
            source,
        })
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
