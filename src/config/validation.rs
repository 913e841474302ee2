//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, ports numeric)
//! - Check that the selected transport has what it needs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: IngestConfig → Result<(), Vec<ValidationError>>
//! - Runs before any socket or directory is touched

use std::net::SocketAddr;

use crate::config::schema::{IngestConfig, TransportMode};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.address must not be empty")]
    EmptyAddress,

    #[error("listener.address {0:?} must be host:port in {1} mode")]
    InvalidTcpAddress(String, TransportMode),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("listener.handshake_timeout_secs must be greater than zero")]
    ZeroHandshakeTimeout,

    #[error("listener.tls.{0} must not be empty in tls mode")]
    MissingCredential(&'static str),

    #[error("output.directory must not be empty")]
    EmptyOutputDirectory,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &IngestConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    if listener.address.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress);
    } else if listener.mode != TransportMode::Gateway && !has_port(&listener.address) {
        errors.push(ValidationError::InvalidTcpAddress(
            listener.address.clone(),
            listener.mode,
        ));
    }

    if listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    if listener.mode == TransportMode::Tls {
        if listener.handshake_timeout_secs == 0 {
            errors.push(ValidationError::ZeroHandshakeTimeout);
        }
        if listener.tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::MissingCredential("cert_path"));
        }
        if listener.tls.key_path.trim().is_empty() {
            errors.push(ValidationError::MissingCredential("key_path"));
        }
    }

    if config.output.directory.trim().is_empty() {
        errors.push(ValidationError::EmptyOutputDirectory);
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a numeric port; the host may be empty or a bracketed IPv6 literal.
fn has_port(address: &str) -> bool {
    address
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&IngestConfig::default()), Ok(()));
    }

    #[test]
    fn all_errors_are_reported() {
        let mut config = IngestConfig::default();
        config.listener.address = "localhost".into();
        config.listener.max_connections = 0;
        config.listener.tls.key_path = String::new();
        config.output.directory = " ".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidTcpAddress("localhost".into(), TransportMode::Tls),
                ValidationError::ZeroConnections,
                ValidationError::MissingCredential("key_path"),
                ValidationError::EmptyOutputDirectory,
            ]
        );
    }

    #[test]
    fn gateway_accepts_socket_paths_and_ignores_credentials() {
        let mut config = IngestConfig::default();
        config.listener.mode = TransportMode::Gateway;
        config.listener.address = "ingest.sock".into();
        config.listener.tls.cert_path = String::new();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn tcp_address_forms() {
        assert!(has_port("0.0.0.0:4433"));
        assert!(has_port(":8080"));
        assert!(has_port("[::1]:443"));
        assert!(has_port("localhost:80"));
        assert!(!has_port("localhost"));
        assert!(!has_port("host:http"));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = IngestConfig::default();
        config.observability.metrics_address = "nope".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::InvalidMetricsAddress("nope".into())])
        );
    }
}
