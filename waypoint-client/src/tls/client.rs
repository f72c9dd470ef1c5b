//! TLS client configuration for mTLS connections.
//!
//! Provides client-side TLS configuration using rustls 0.23+. The server is
//! verified against the CA trust certificate alone; the platform root store is
//! never consulted.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::config::CredentialPaths;
use crate::error::{BootstrapError, Result};

/// Client TLS identity (certificate chain + private key) loaded from PEM files.
pub struct ClientIdentity {
    /// Leaf first
    pub cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    /// Load the certificate chain from `cert_path` and the key from `key_path`.
    ///
    /// The key may be SEC1, PKCS#1 or PKCS#8 PEM.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_chain = load_certs(cert_path)?;

        let pem = read(key_path)?;
        let key = rustls_pemfile::private_key(&mut pem.as_slice())
            .map_err(|e| invalid(key_path, e))?
            .ok_or_else(|| invalid(key_path, "no private key found"))?;

        Ok(Self { cert_chain, key })
    }
}

/// Trust store holding exactly the certificates in `ca_path`.
pub fn load_ca_roots(ca_path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert).map_err(|e| invalid(ca_path, e))?;
    }
    Ok(roots)
}

/// Build a TLS client config for mTLS from the three credential files.
pub fn build_mtls_config(paths: &CredentialPaths) -> Result<ClientConfig> {
    let roots = load_ca_roots(paths.ca_trust())?;
    let identity = ClientIdentity::load(paths.cert(), paths.key())?;

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| invalid(paths.ca_trust(), e))?
    .with_root_certificates(roots)
    .with_client_auth_cert(identity.cert_chain, identity.key)
    .map_err(|e| invalid(paths.key(), format!("client certificate rejected: {e}")))?;

    Ok(config)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = read(path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| invalid(path, e))?;
    if certs.is_empty() {
        return Err(invalid(path, "no certificate found"));
    }
    Ok(certs)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| BootstrapError::fs(path, e))
}

fn invalid(path: &Path, reason: impl ToString) -> BootstrapError {
    BootstrapError::InvalidCredentials {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
