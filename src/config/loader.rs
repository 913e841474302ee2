//! Loading the optional TOML configuration file.
//!
//! The file supplies defaults that command-line flags then override, so
//! reading and validating are separate steps.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::IngestConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration could not be turned into a runnable server.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Every problem found, not just the first.
    #[error("Invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse a TOML file without semantic checks.
///
/// Used when further overrides are applied before validation.
pub fn read_config(path: &Path) -> Result<IngestConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<IngestConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TransportMode;

    #[test]
    fn loads_valid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ingest.toml");
        fs::write(
            &path,
            "[listener]\nmode = \"plaintext\"\naddress = \"127.0.0.1:8080\"\n[output]\ndirectory = \"/srv/posts\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.mode, TransportMode::Plaintext);
        assert_eq!(config.output.directory, "/srv/posts");
    }

    #[test]
    fn invalid_file_lists_problems() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ingest.toml");
        fs::write(&path, "[listener]\nmax_connections = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref v) if v.len() == 1));
        assert!(err.to_string().contains("max_connections"));

        // Reading alone does not validate.
        assert!(read_config(&path).is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/ingest.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/ingest.toml"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ingest.toml");
        fs::write(&path, "[listener\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
