//! Bootstrap error taxonomy.

use std::path::PathBuf;

use crate::enrollment::EnrollmentStep;

/// Errors that abort client construction.
///
/// Nothing is retried implicitly; see [`crate::settings::RetryPolicy`] for the
/// opt-in network retry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BootstrapError {
    /// Endpoint unreachable, timed out, or answered with a non-success status.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// Registry payload malformed or incomplete.
    #[error("invalid registry data: {0}")]
    Parse(String),

    /// No service descriptor matches the requested name.
    #[error("no service named {name:?} in registry at {registry}")]
    NotFound { name: String, registry: String },

    /// A key tool operation failed, or the CA answered with something unusable.
    #[error("enrollment step {step} failed: {reason}")]
    ToolExecution { step: EnrollmentStep, reason: String },

    /// Reading or writing a cache artifact failed.
    #[error("filesystem error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A credential file exists but cannot be turned into TLS credentials.
    #[error("invalid credentials in {}: {reason}", path.display())]
    InvalidCredentials { path: PathBuf, reason: String },

    /// The transport rejected the channel endpoint.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl BootstrapError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tool(step: EnrollmentStep, reason: impl ToString) -> Self {
        Self::ToolExecution {
            step,
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
