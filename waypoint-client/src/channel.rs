//! Transport channel construction.
//!
//! Channels connect lazily: building one never touches the network, and a
//! refused connection surfaces on the first call.

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::settings::Settings;
use crate::tls;

/// Builds plaintext or mutual-TLS channels for a resolved service.
#[derive(Debug, Clone, Copy)]
pub struct ChannelFactory {
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl ChannelFactory {
    pub fn new(settings: &Settings) -> Self {
        Self {
            request_timeout: settings.request_timeout,
            connect_timeout: settings.connect_timeout,
        }
    }

    /// Channel to `{domain}:{port}`, encrypted exactly when the config carries
    /// credential paths.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(&self, config: &ServiceConfig) -> Result<Channel> {
        match &config.tls {
            None => {
                tracing::debug!(address = %config.address(), "Opening plaintext channel");
                let channel = Endpoint::from_shared(format!("http://{}", config.address()))?
                    .timeout(self.request_timeout)
                    .connect_timeout(self.connect_timeout)
                    .connect_lazy();
                Ok(channel)
            }
            Some(paths) => {
                tracing::debug!(
                    address = %config.address(),
                    ca = %paths.ca_trust().display(),
                    cert = %paths.cert().display(),
                    key = %paths.key().display(),
                    "Opening mTLS channel"
                );
                let tls_config = tls::build_mtls_config(paths)?;
                tls::build_tls_channel(
                    &config.domain,
                    config.port,
                    tls_config,
                    self.request_timeout,
                    self.connect_timeout,
                )
            }
        }
    }
}
