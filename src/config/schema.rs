//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from a TOML file.
//! Every field has a default so an empty file (or no file) is valid input.

use serde::{Deserialize, Serialize};

/// Root configuration for the ingest server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    /// Transport selection and bind target.
    pub listener: ListenerConfig,

    /// Where request bodies are stored.
    pub output: OutputConfig,

    /// Shutdown behaviour.
    pub lifecycle: LifecycleConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Which listening mode the server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// HTTPS on a TCP address.
    #[default]
    Tls,
    /// HTTP on a TCP address.
    Plaintext,
    /// FastCGI on a Unix socket path.
    Gateway,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Tls => "tls",
            TransportMode::Plaintext => "plaintext",
            TransportMode::Gateway => "gateway",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listening mode.
    pub mode: TransportMode,

    /// `host:port` for TCP modes, a socket path for gateway mode.
    /// Relative socket paths resolve against the startup working directory.
    pub address: String,

    /// Certificate and key, used in TLS mode.
    pub tls: TlsConfig,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// TLS handshake deadline in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Tls,
            address: "0.0.0.0:4433".to_string(),
            tls: TlsConfig::default(),
            max_connections: 10_000,
            handshake_timeout_secs: 10,
        }
    }
}

/// TLS credential files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        }
    }
}

/// Output directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one file per accepted request.
    pub directory: String,

    /// `fsync` each file before answering with the byte count.
    pub sync_on_complete: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "posts".to_string(),
            sync_on_complete: false,
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long open connections may drain after the listener closes.
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
