//! Remote certificate authority client.
//!
//! The registry host exposes two plain-HTTP endpoints next to `/config`:
//!
//! - `GET /get_ca_certificate` returns the CA trust certificate as PEM
//! - `GET /sign_ca_certificate?=<base64 CSR>` returns the signed client certificate as PEM
//!
//! # Security
//!
//! The signing request travels unauthenticated, in the query string of a GET.
//! Any party that can reach the registry can obtain a client certificate, and
//! the CSR ends up in access logs. This mirrors what deployed registries
//! accept today; changing the method or adding authentication needs a
//! matching server change.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::Result;
use crate::http::RegistryHttp;

/// The CA half of the enrollment exchange.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Fetch the CA trust certificate (PEM) served for `domain`.
    async fn fetch_ca_certificate(&self, domain: &str, config_port: u16) -> Result<String>;

    /// Submit `csr_pem` for signing and return the client certificate (PEM).
    async fn sign_certificate(&self, domain: &str, config_port: u16, csr_pem: &str)
        -> Result<String>;
}

/// [`CertificateAuthority`] speaking the registry's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpCertificateAuthority {
    http: RegistryHttp,
}

impl HttpCertificateAuthority {
    pub fn new(http: RegistryHttp) -> Self {
        Self { http }
    }

    pub fn ca_certificate_url(domain: &str, config_port: u16) -> String {
        format!("http://{domain}:{config_port}/get_ca_certificate")
    }

    /// Signing URL with the CSR PEM base64-encoded (standard alphabet) as the
    /// unnamed query parameter.
    pub fn sign_url(domain: &str, config_port: u16, csr_pem: &str) -> String {
        format!(
            "http://{domain}:{config_port}/sign_ca_certificate?={}",
            STANDARD.encode(csr_pem)
        )
    }
}

#[async_trait]
impl CertificateAuthority for HttpCertificateAuthority {
    async fn fetch_ca_certificate(&self, domain: &str, config_port: u16) -> Result<String> {
        self.http
            .get_text(&Self::ca_certificate_url(domain, config_port))
            .await
    }

    async fn sign_certificate(
        &self,
        domain: &str,
        config_port: u16,
        csr_pem: &str,
    ) -> Result<String> {
        tracing::debug!(domain, "Submitting CSR for signing");
        self.http
            .get_text(&Self::sign_url(domain, config_port, csr_pem))
            .await
    }
}
