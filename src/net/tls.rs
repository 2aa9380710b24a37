//! TLS configuration and certificate loading.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

/// Error type for TLS setup. Every variant is fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0:?}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("cannot generate self-signed certificate: {0}")]
    SelfSigned(#[from] rcgen::Error),

    #[error("invalid TLS configuration: {0}")]
    Config(#[source] std::io::Error),
}

/// Build the rustls server config described by `config`.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    match config {
        TlsConfig::Pem {
            cert_path,
            key_path,
        } => load_pem_pair(cert_path, key_path).await,
        TlsConfig::SelfSigned { hosts } => self_signed(hosts).await,
    }
}

/// Load and sanity-check a PEM certificate chain and private key.
pub async fn load_pem_pair(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let cert_pem = read(cert_path).await?;
    let key_pem = read(key_path).await?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(cert_path.to_path_buf()));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice())).map_err(
        |source| TlsError::Read {
            path: key_path.to_path_buf(),
            source,
        },
    )?;
    if key.is_none() {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }

    tracing::info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        chain_len = certs.len(),
        "TLS certificate loaded"
    );

    RustlsConfig::from_pem(cert_pem, key_pem)
        .await
        .map_err(TlsError::Config)
}

/// Generate a throwaway certificate for `hosts`. Clients will not trust it.
pub async fn self_signed(hosts: &[String]) -> Result<RustlsConfig, TlsError> {
    let certified = rcgen::generate_simple_self_signed(hosts.to_vec())?;
    tracing::warn!(hosts = ?hosts, "Serving HTTPS with a self-signed certificate");

    RustlsConfig::from_pem(
        certified.cert.pem().into_bytes(),
        certified.key_pair.serialize_pem().into_bytes(),
    )
    .await
    .map_err(TlsError::Config)
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{name}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn self_signed_builds() {
        assert!(self_signed(&["localhost".to_string()]).await.is_ok());
    }

    #[tokio::test]
    async fn pem_pair_round_trip() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = temp_path("cert.pem");
        let key = temp_path("cert.key");
        std::fs::write(&cert, certified.cert.pem()).unwrap();
        std::fs::write(&key, certified.key_pair.serialize_pem()).unwrap();

        let result = load_tls_config(&TlsConfig::Pem {
            cert_path: cert.clone(),
            key_path: key.clone(),
        })
        .await;
        assert!(result.is_ok());

        std::fs::remove_file(cert).unwrap();
        std::fs::remove_file(key).unwrap();
    }

    #[tokio::test]
    async fn missing_files_fail() {
        let err = load_pem_pair(Path::new("/nonexistent/c.pem"), Path::new("/nonexistent/c.key"))
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
    }

    #[tokio::test]
    async fn key_file_without_key_fails() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = temp_path("cert.pem");
        std::fs::write(&cert, certified.cert.pem()).unwrap();

        let err = load_pem_pair(&cert, &cert).await.unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)));

        std::fs::remove_file(cert).unwrap();
    }
}
