//! Bootstrapped service client.
//!
//! [`ServiceClient::connect`] runs the whole sequence:
//! resolve the descriptor, source TLS credentials, build the channel.
//!
//! Credential sourcing for a TLS service depends on the domain's token file:
//! with a token present the paths listed on the registry entry are used as
//! is; without one the client enrolls and uses the bundle under
//! `config/tls/{domain}/`. Token presence stands in for "trust already
//! established", so a stale token file suppresses enrollment.

use std::path::Path;
use std::sync::Arc;

use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::Request;
use waypoint_ca::{KeyTool, LocalKeyTool};

use crate::cache::CredentialCache;
use crate::channel::ChannelFactory;
use crate::config::{CredentialPaths, ServiceConfig};
use crate::context::{CallContextBuilder, CallOptions, MetadataError};
use crate::enrollment::{
    CertificateAuthority, Enrollment, EnrollmentOutcome, HttpCertificateAuthority,
};
use crate::error::Result;
use crate::http::RegistryHttp;
use crate::resolver::{ConfigResolver, ServiceDescriptor};
use crate::settings::Settings;

/// A resolved service with a ready channel.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    config: Arc<ServiceConfig>,
    channel: Channel,
    cache: CredentialCache,
    enrollment: Option<EnrollmentOutcome>,
}

impl ServiceClient {
    /// Resolve `name` from the registry at `domain:config_port` and connect.
    pub async fn connect(
        name: &str,
        domain: &str,
        config_port: u16,
        settings: Settings,
    ) -> Result<Self> {
        Self::builder(settings)
            .connect(name, domain, config_port)
            .await
    }

    /// Builder for custom key tool or certificate authority implementations.
    pub fn builder(settings: Settings) -> ServiceClientBuilder {
        ServiceClientBuilder::new(settings)
    }

    pub fn config(&self) -> &Arc<ServiceConfig> {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn proxy_port(&self) -> u16 {
        self.config.proxy_port
    }

    pub fn address(&self) -> String {
        self.config.address()
    }

    pub fn proxy_address(&self) -> String {
        self.config.proxy_address()
    }

    pub fn has_tls(&self) -> bool {
        self.config.tls_enabled()
    }

    pub fn ca_file(&self) -> Option<&Path> {
        self.config.tls.as_ref().map(CredentialPaths::ca_trust)
    }

    pub fn cert_file(&self) -> Option<&Path> {
        self.config.tls.as_ref().map(CredentialPaths::cert)
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.config.tls.as_ref().map(CredentialPaths::key)
    }

    /// Channel handle; clones share the underlying connection.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Enrollment performed during construction, if any.
    pub fn enrollment(&self) -> Option<&EnrollmentOutcome> {
        self.enrollment.as_ref()
    }

    pub fn call_context(&self) -> CallContextBuilder<'_> {
        CallContextBuilder::new(&self.cache, &self.config.domain)
    }

    pub fn call_metadata(&self, opts: &CallOptions) -> Result<MetadataMap, MetadataError> {
        self.call_context().build(opts)
    }

    pub fn request<T>(&self, message: T, opts: &CallOptions) -> Result<Request<T>, MetadataError> {
        self.call_context().request(message, opts)
    }
}

/// Configures how a [`ServiceClient`] is bootstrapped.
pub struct ServiceClientBuilder {
    settings: Settings,
    key_tool: Option<Box<dyn KeyTool>>,
    authority: Option<Box<dyn CertificateAuthority>>,
}

impl ServiceClientBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            key_tool: None,
            authority: None,
        }
    }

    pub fn key_tool(mut self, key_tool: impl KeyTool + 'static) -> Self {
        self.key_tool = Some(Box::new(key_tool));
        self
    }

    pub fn certificate_authority(mut self, authority: impl CertificateAuthority + 'static) -> Self {
        self.authority = Some(Box::new(authority));
        self
    }

    pub async fn connect(
        self,
        name: &str,
        domain: &str,
        config_port: u16,
    ) -> Result<ServiceClient> {
        let http = RegistryHttp::new(&self.settings)?;
        let cache = CredentialCache::new(&self.settings.cache_root);

        let descriptor = ConfigResolver::new(http.clone())
            .resolve(domain, config_port, name)
            .await?;

        let (tls, enrollment) = if descriptor.tls {
            let authority: Box<dyn CertificateAuthority> = match self.authority {
                Some(authority) => authority,
                None => Box::new(HttpCertificateAuthority::new(http)),
            };
            let key_tool: Box<dyn KeyTool> = match self.key_tool {
                Some(key_tool) => key_tool,
                None => Box::new(LocalKeyTool::new()),
            };
            let (paths, outcome) = source_credentials(
                &cache,
                &descriptor,
                config_port,
                key_tool.as_ref(),
                authority.as_ref(),
            )
            .await?;
            (Some(paths), outcome)
        } else {
            (None, None)
        };

        let config = ServiceConfig::new(&descriptor, tls);
        let channel = ChannelFactory::new(&self.settings).build(&config)?;

        tracing::info!(
            name = %config.name,
            address = %config.address(),
            tls = config.tls_enabled(),
            "Service client ready"
        );

        Ok(ServiceClient {
            config: Arc::new(config),
            channel,
            cache,
            enrollment,
        })
    }
}

/// Credential paths for a TLS service, enrolling when no token is cached.
async fn source_credentials(
    cache: &CredentialCache,
    descriptor: &ServiceDescriptor,
    config_port: u16,
    key_tool: &dyn KeyTool,
    authority: &dyn CertificateAuthority,
) -> Result<(CredentialPaths, Option<EnrollmentOutcome>)> {
    let domain = &descriptor.domain;

    if cache.has_token(domain)? {
        tracing::debug!(%domain, "Token cached, using credential paths from registry");
        return Ok((CredentialPaths::from_descriptor(descriptor)?, None));
    }

    tracing::debug!(%domain, "No token cached, enrolling client certificate");
    let outcome = Enrollment::new(cache, key_tool, authority)
        .run(domain, config_port)
        .await?;
    Ok((CredentialPaths::from_bundle(&outcome.paths), Some(outcome)))
}
