//! Service client bootstrap.
//!
//! Given a service name, a registry domain and the registry's configuration
//! port, [`ServiceClient::connect`]:
//!
//! 1. resolves the service descriptor from `http://{domain}:{port}/config`
//! 2. for TLS services, sources client credentials, either from the registry
//!    entry (token cached) or by enrolling a certificate with the registry's CA
//! 3. builds a plaintext or mutual-TLS channel to the service
//!
//! Per-call authentication metadata comes from [`ServiceClient::call_metadata`].
//!
//! ```no_run
//! use waypoint_client::{CallOptions, ServiceClient, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client =
//!     ServiceClient::connect("echo.EchoService", "localhost", 10000, Settings::default()).await?;
//! let request = client.request("hello", &CallOptions::new().path("/echo.EchoService/Echo"))?;
//! # let _ = request;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod channel;
mod client;
pub mod config;
pub mod context;
pub mod enrollment;
mod error;
pub mod http;
pub mod resolver;
pub mod settings;
pub mod tls;

pub use cache::{BundlePaths, CredentialCache, DomainLock};
pub use channel::ChannelFactory;
pub use client::{ServiceClient, ServiceClientBuilder};
pub use config::{CredentialPaths, ServiceConfig};
pub use context::{CallContextBuilder, CallOptions, MetadataError};
pub use enrollment::{
    CertificateAuthority, Enrollment, EnrollmentOutcome, EnrollmentState, EnrollmentStep,
    HttpCertificateAuthority,
};
pub use error::{BootstrapError, Result};
pub use resolver::{select_service, ConfigResolver, ServiceDescriptor};
pub use settings::{RetryPolicy, Settings, SettingsError};

pub use waypoint_ca::{KeyTool, LocalKeyTool};
