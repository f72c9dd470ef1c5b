//! Error types for key and certificate operations.

/// Errors raised by the key tool and the PEM/X.509 inspectors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CaError {
    /// The private key could not be decoded or encoded.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// The signing request could not be built.
    #[error("failed to build certificate signing request: {0}")]
    CsrGeneration(String),

    /// The input is larger than any sane PEM artifact.
    #[error("PEM input too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// No PEM block with the expected label was found.
    #[error("expected a PEM block labelled {expected}")]
    MissingPem { expected: &'static str },

    /// The PEM block decoded but its DER payload is malformed.
    #[error("failed to parse {what}: {reason}")]
    Malformed { what: &'static str, reason: String },
}
