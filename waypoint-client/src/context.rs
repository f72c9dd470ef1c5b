//! Per-call authentication metadata.
//!
//! Each call gets a fresh [`MetadataMap`] carrying up to four keys:
//!
//! | key           | value                                                   |
//! |---------------|---------------------------------------------------------|
//! | `token`       | explicit token, else the cached token for the domain     |
//! | `domain`      | explicit domain, else the client's domain (always sent) |
//! | `application` | only when non-empty                                      |
//! | `path`        | only when non-empty                                      |

use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::Request;

use crate::cache::CredentialCache;
use crate::error::BootstrapError;

pub const TOKEN_KEY: &str = "token";
pub const DOMAIN_KEY: &str = "domain";
pub const APPLICATION_KEY: &str = "application";
pub const PATH_KEY: &str = "path";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MetadataError {
    /// A value holds bytes outside visible ASCII, space and tab.
    #[error("value for metadata key {key:?} is not valid ASCII metadata")]
    InvalidValue { key: &'static str },

    /// The cached token could not be read.
    #[error("cannot read cached token: {0}")]
    Token(#[source] BootstrapError),
}

/// Optional per-call values. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub token: Option<String>,
    pub application: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Builds call metadata for one client.
#[derive(Debug, Clone)]
pub struct CallContextBuilder<'a> {
    cache: &'a CredentialCache,
    domain: &'a str,
}

impl<'a> CallContextBuilder<'a> {
    /// `domain` is used whenever a call does not name one.
    pub fn new(cache: &'a CredentialCache, domain: &'a str) -> Self {
        Self { cache, domain }
    }

    /// Metadata for one call.
    ///
    /// Without an explicit token the cache is read again on every call, so a
    /// token stored after the client was built is picked up.
    pub fn build(&self, opts: &CallOptions) -> Result<MetadataMap, MetadataError> {
        let mut metadata = MetadataMap::new();
        let domain = non_empty(&opts.domain).unwrap_or(self.domain);

        let cached;
        let token = match non_empty(&opts.token) {
            Some(token) => Some(token),
            None => {
                cached = self
                    .cache
                    .read_token(domain)
                    .map_err(MetadataError::Token)?;
                cached.as_deref()
            }
        };

        if let Some(token) = token {
            insert(&mut metadata, TOKEN_KEY, token)?;
        }
        insert(&mut metadata, DOMAIN_KEY, domain)?;
        if let Some(application) = non_empty(&opts.application) {
            insert(&mut metadata, APPLICATION_KEY, application)?;
        }
        if let Some(path) = non_empty(&opts.path) {
            insert(&mut metadata, PATH_KEY, path)?;
        }

        Ok(metadata)
    }

    /// Wrap `message` in a request carrying this call's metadata.
    pub fn request<T>(&self, message: T, opts: &CallOptions) -> Result<Request<T>, MetadataError> {
        let metadata = self.build(opts)?;
        let mut request = Request::new(message);
        *request.metadata_mut() = metadata;
        Ok(request)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `MetadataValue` parsing lets obs-text (0x80-0xFF) through, so the ASCII
/// check comes first.
fn insert(metadata: &mut MetadataMap, key: &'static str, value: &str) -> Result<(), MetadataError> {
    if !is_visible_ascii(value) {
        return Err(MetadataError::InvalidValue { key });
    }
    let value = MetadataValue::try_from(value).map_err(|_| MetadataError::InvalidValue { key })?;
    metadata.insert(key, value);
    Ok(())
}

fn is_visible_ascii(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b == b'\t' || (b' '..=b'~').contains(&b))
}
