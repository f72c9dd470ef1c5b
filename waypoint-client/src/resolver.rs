//! Service descriptor resolution against the registry's `/config` endpoint.
//!
//! The registry answers with
//!
//! ```json
//! {"Services": {"<key>": {"Id": "...", "Name": "...", "Domain": "...",
//!                         "Port": 8080, "Proxy": 8081, "TLS": false}}}
//! ```
//!
//! The first entry, in response order, whose key or `Id` equals the requested
//! name wins. Only the matched entry is validated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BootstrapError, Result};
use crate::http::RegistryHttp;

/// One service entry as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Proxy")]
    pub proxy_port: u16,
    #[serde(rename = "TLS")]
    pub tls: bool,
    #[serde(rename = "CertAuthorityTrust", default, skip_serializing_if = "Option::is_none")]
    pub cert_authority_trust: Option<String>,
    #[serde(rename = "CertFile", default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(rename = "KeyFile", default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

impl ServiceDescriptor {
    /// `{domain}:{port}`
    pub fn address(&self) -> String {
        format!("{}:{}", self.domain, self.port)
    }
}

/// Fetches and selects service descriptors from a registry.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    http: RegistryHttp,
}

impl ConfigResolver {
    pub fn new(http: RegistryHttp) -> Self {
        Self { http }
    }

    /// URL of the registry configuration endpoint.
    pub fn config_url(domain: &str, config_port: u16) -> String {
        format!("http://{domain}:{config_port}/config")
    }

    /// Fetch the registry at `domain:config_port` and select `name`.
    pub async fn resolve(
        &self,
        domain: &str,
        config_port: u16,
        name: &str,
    ) -> Result<ServiceDescriptor> {
        let url = Self::config_url(domain, config_port);
        tracing::debug!(%url, name, "Fetching service configuration");

        let body = self.http.get_text(&url).await?;
        let descriptor = select_service(&body, name).map_err(|e| match e {
            BootstrapError::NotFound { name, .. } => BootstrapError::NotFound {
                name,
                registry: url.clone(),
            },
            other => other,
        })?;

        tracing::info!(
            id = %descriptor.id,
            domain = %descriptor.domain,
            port = descriptor.port,
            tls = descriptor.tls,
            "Service configuration resolved"
        );
        Ok(descriptor)
    }
}

/// Select `name` from a registry `/config` body.
///
/// Fails with [`BootstrapError::Parse`] on malformed JSON, a missing
/// `Services` object or an incomplete matched entry, and with
/// [`BootstrapError::NotFound`] when nothing matches.
pub fn select_service(body: &str, name: &str) -> Result<ServiceDescriptor> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| BootstrapError::Parse(format!("registry body is not JSON: {e}")))?;

    let services = root
        .get("Services")
        .and_then(Value::as_object)
        .ok_or_else(|| BootstrapError::Parse("missing \"Services\" object".to_string()))?;

    let (key, entry) = services
        .iter()
        .find(|(key, entry)| {
            key.as_str() == name || entry.get("Id").and_then(Value::as_str) == Some(name)
        })
        .ok_or_else(|| BootstrapError::NotFound {
            name: name.to_string(),
            registry: String::new(),
        })?;

    let descriptor = ServiceDescriptor::deserialize(entry)
        .map_err(|e| BootstrapError::Parse(format!("service entry {key:?}: {e}")))?;

    if descriptor.port == 0 || descriptor.proxy_port == 0 {
        return Err(BootstrapError::Parse(format!(
            "service entry {key:?}: ports must be non-zero"
        )));
    }

    Ok(descriptor)
}
