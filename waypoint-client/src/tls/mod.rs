//! TLS configuration for secure service channels.

mod client;

use std::time::Duration;

use rustls::ClientConfig;
use tonic::transport::{Channel, Endpoint};

use crate::error::Result;

pub use client::{build_mtls_config, load_ca_roots, ClientIdentity};

/// Build a lazily connecting TLS channel to `https://{domain}:{port}`.
///
/// The server name presented and verified is `domain`.
pub fn build_tls_channel(
    domain: &str,
    port: u16,
    tls_config: ClientConfig,
    request_timeout: Duration,
    connect_timeout: Duration,
) -> Result<Channel> {
    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_only()
        .enable_http2()
        .build();
    let channel = Endpoint::from_shared(format!("https://{domain}:{port}"))?
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .connect_with_connector_lazy(https_connector);
    Ok(channel)
}
