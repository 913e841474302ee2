//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Load TLS configuration from certificate and key files.
///
/// The certificate file may hold a full chain; the first private key in the
/// key file is used (PKCS#1, PKCS#8 or SEC1).
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, io::Error> {
    let certs = read_certificates(cert_path)?;
    let key = read_private_key(key_path)?;

    RustlsConfig::from_der(certs, key).await
}

fn read_certificates(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let mut reader = BufReader::new(open(path, "Certificate")?);
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.to_vec()))
        .collect::<io::Result<Vec<_>>>()?;

    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No certificates found in {:?}", path),
        ));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> io::Result<Vec<u8>> {
    let mut reader = BufReader::new(open(path, "Private key")?);
    match rustls_pemfile::private_key(&mut reader)? {
        Some(key) => Ok(key.secret_der().to_vec()),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No private key found in {:?}", path),
        )),
    }
}

fn open(path: &Path, what: &str) -> io::Result<File> {
    File::open(path).map_err(|e| {
        io::Error::new(e.kind(), format!("{} file {:?} unreadable: {}", what, path, e))
    })
}
