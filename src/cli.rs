//! Command-line interface.
//!
//! Flags override the optional TOML file; the merged result is validated
//! before anything is bound.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::{IngestConfig, LogFormat, TransportMode};

#[derive(Debug, Parser)]
#[command(name = "post-ingest", version)]
#[command(
    about = "Accepts POST requests via HTTPS (or plaintext HTTP with --http) and \
             stores each body in a file named after the client address and path"
)]
pub struct Cli {
    /// TOML configuration file; flags take precedence over it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serve plaintext HTTP
    #[arg(long, conflicts_with = "fcgi")]
    pub http: bool,

    /// Serve FastCGI and take the listen address as a path to a unix socket
    #[arg(long)]
    pub fcgi: bool,

    /// Listen address (default 0.0.0.0:4433)
    #[arg(short = 'l', long = "listen", value_name = "ADDRESS")]
    pub listen: Option<String>,

    /// TLS certificate file (default cert.pem); a relative path resolves
    /// against the starting directory, not --dir
    #[arg(short = 'c', long, value_name = "CERTIFICATE")]
    pub cert: Option<String>,

    /// TLS key file (default key.pem); a relative path resolves against the
    /// starting directory, not --dir
    #[arg(short = 'k', long, value_name = "KEY")]
    pub key: Option<String>,

    /// POSTed files directory (default posts)
    #[arg(long, value_name = "DIRECTORY")]
    pub dir: Option<String>,

    /// Log output format
    #[arg(long, value_parser = ["pretty", "json"])]
    pub log_format: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDRESS")]
    pub metrics: Option<String>,
}

impl Cli {
    /// Merge flags over the configuration file (or defaults) and validate.
    pub fn into_config(self) -> Result<IngestConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => IngestConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut IngestConfig) {
        if self.http {
            config.listener.mode = TransportMode::Plaintext;
        }
        if self.fcgi {
            config.listener.mode = TransportMode::Gateway;
        }
        if let Some(listen) = self.listen {
            config.listener.address = listen;
        }
        if let Some(cert) = self.cert {
            config.listener.tls.cert_path = cert;
        }
        if let Some(key) = self.key {
            config.listener.tls.key_path = key;
        }
        if let Some(dir) = self.dir {
            config.output.directory = dir;
        }
        match self.log_format.as_deref() {
            Some("json") => config.observability.log_format = LogFormat::Json,
            Some("pretty") => config.observability.log_format = LogFormat::Pretty,
            _ => {}
        }
        if let Some(metrics) = self.metrics {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = metrics;
        }
    }
}
