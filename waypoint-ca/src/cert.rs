//! Certificate utilities for X.509 parsing.
//!
//! # Security
//!
//! - Single artifacts (CSR, leaf certificate) are limited to 16KB
//! - Certificate documents may be trust bundles and are limited to 512KB
//! - The x509_parser library handles ASN.1 parsing safely

use sha2::{Digest, Sha256};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::error::CaError;

/// Maximum PEM artifact size (16KB is generous for a single cert or CSR)
pub const MAX_PEM_SIZE: usize = 16 * 1024;

/// Maximum size of a certificate document, which may be a whole CA trust
/// bundle rather than one certificate.
pub const MAX_CERT_BUNDLE_SIZE: usize = 512 * 1024;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Summary of a PEM certificate, enough to validate a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject common name, if the subject carries one
    pub common_name: Option<String>,
    /// Raw `subjectPublicKey` bytes
    pub public_key: Vec<u8>,
    /// End of the validity window (Unix seconds)
    pub not_after: i64,
    /// SHA-256 of the certificate DER, `SHA256:` prefixed hex
    pub fingerprint: String,
}

/// Parse the first `CERTIFICATE` block of a PEM document.
///
/// Extra blocks (an intermediate appended by the CA, the rest of a trust
/// bundle) are ignored; only the first certificate is described. The
/// document may be up to [`MAX_CERT_BUNDLE_SIZE`] but the described
/// certificate itself must fit in [`MAX_PEM_SIZE`].
pub fn inspect_certificate(pem: &str) -> Result<CertificateInfo, CaError> {
    let block = first_pem_block(pem, CERTIFICATE_LABEL, MAX_CERT_BUNDLE_SIZE)?;
    if block.contents.len() > MAX_PEM_SIZE {
        return Err(CaError::TooLarge {
            size: block.contents.len(),
            max: MAX_PEM_SIZE,
        });
    }

    let (_, cert) = X509Certificate::from_der(&block.contents).map_err(|e| CaError::Malformed {
        what: "certificate",
        reason: format!("{:?}", e),
    })?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    Ok(CertificateInfo {
        common_name,
        public_key: cert.public_key().subject_public_key.data.to_vec(),
        not_after: cert.validity().not_after.timestamp(),
        fingerprint: fingerprint_der(&block.contents),
    })
}

/// Find the first PEM block carrying `label` in a document of at most `max` bytes.
pub(crate) fn first_pem_block(pem: &str, label: &'static str, max: usize) -> Result<Pem, CaError> {
    if pem.len() > max {
        return Err(CaError::TooLarge {
            size: pem.len(),
            max,
        });
    }

    for block in Pem::iter_from_buffer(pem.as_bytes()) {
        match block {
            Ok(block) if block.label == label => return Ok(block),
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    Err(CaError::MissingPem { expected: label })
}

fn fingerprint_der(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("SHA256:{hex}")
}
