//! Certificate signing requests.
//!
//! The subject of every request is exactly `CN={domain}`; the remote CA
//! decides extensions and validity.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

use crate::cert::{first_pem_block, MAX_PEM_SIZE};
use crate::error::CaError;
use crate::key::ClientKey;

const CSR_LABEL: &str = "CERTIFICATE REQUEST";

/// Summary of a PEM signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrInfo {
    /// Subject common name, if present
    pub common_name: Option<String>,
    /// Raw `subjectPublicKey` bytes
    pub public_key: Vec<u8>,
}

/// Build a PEM-encoded CSR for `key` with subject `CN={domain}`.
pub fn build_csr(key: &ClientKey, domain: &str) -> Result<String, CaError> {
    if domain.is_empty() {
        return Err(CaError::CsrGeneration("empty common name".to_string()));
    }

    let pkcs8_der = key.to_pkcs8_der()?;
    let key_pair =
        KeyPair::try_from(&pkcs8_der[..]).map_err(|e| CaError::InvalidKey(e.to_string()))?;

    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, domain);

    params
        .serialize_request(&key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| CaError::CsrGeneration(e.to_string()))
}

/// Parse the first `CERTIFICATE REQUEST` block of a PEM document.
pub fn inspect_csr(pem: &str) -> Result<CsrInfo, CaError> {
    let block = first_pem_block(pem, CSR_LABEL, MAX_PEM_SIZE)?;

    let (_, csr) =
        X509CertificationRequest::from_der(&block.contents).map_err(|e| CaError::Malformed {
            what: "certificate signing request",
            reason: format!("{:?}", e),
        })?;

    let info = &csr.certification_request_info;
    let common_name = info
        .subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    Ok(CsrInfo {
        common_name,
        public_key: info.subject_pki.subject_public_key.data.to_vec(),
    })
}
