//! Resolved, immutable service configuration.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::BundlePaths;
use crate::error::{BootstrapError, Result};
use crate::resolver::ServiceDescriptor;

/// The three files a mutual-TLS channel is built from.
///
/// None of the paths can be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialPaths {
    ca_trust: PathBuf,
    cert: PathBuf,
    key: PathBuf,
}

impl CredentialPaths {
    pub fn new(
        ca_trust: impl Into<PathBuf>,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Result<Self> {
        let paths = Self {
            ca_trust: ca_trust.into(),
            cert: cert.into(),
            key: key.into(),
        };
        for (field, path) in [
            ("CertAuthorityTrust", &paths.ca_trust),
            ("CertFile", &paths.cert),
            ("KeyFile", &paths.key),
        ] {
            if path.as_os_str().is_empty() {
                return Err(BootstrapError::Parse(format!("{field} must not be empty")));
            }
        }
        Ok(paths)
    }

    /// Paths listed on the registry entry itself.
    pub fn from_descriptor(descriptor: &ServiceDescriptor) -> Result<Self> {
        let field = |value: &Option<String>, name: &str| {
            value.clone().ok_or_else(|| {
                BootstrapError::Parse(format!(
                    "service {:?} enables TLS but lists no {name}",
                    descriptor.id
                ))
            })
        };
        Self::new(
            field(&descriptor.cert_authority_trust, "CertAuthorityTrust")?,
            field(&descriptor.cert_file, "CertFile")?,
            field(&descriptor.key_file, "KeyFile")?,
        )
    }

    /// Paths of an enrolled bundle.
    pub fn from_bundle(bundle: &BundlePaths) -> Self {
        Self {
            ca_trust: bundle.ca_cert.clone(),
            cert: bundle.cert.clone(),
            key: bundle.key.clone(),
        }
    }

    pub fn ca_trust(&self) -> &Path {
        &self.ca_trust
    }

    pub fn cert(&self) -> &Path {
        &self.cert
    }

    pub fn key(&self) -> &Path {
        &self.key
    }
}

/// Identity of the target service, fixed once bootstrap completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub port: u16,
    pub proxy_port: u16,
    /// `Some` exactly when the service requires TLS.
    pub tls: Option<CredentialPaths>,
}

impl ServiceConfig {
    pub fn new(descriptor: &ServiceDescriptor, tls: Option<CredentialPaths>) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            domain: descriptor.domain.clone(),
            port: descriptor.port,
            proxy_port: descriptor.proxy_port,
            tls,
        }
    }

    /// `{domain}:{port}`
    pub fn address(&self) -> String {
        format!("{}:{}", self.domain, self.port)
    }

    /// `{domain}:{proxy_port}`
    pub fn proxy_address(&self) -> String {
        format!("{}:{}", self.domain, self.proxy_port)
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}
