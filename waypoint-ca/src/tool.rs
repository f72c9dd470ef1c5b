//! The key tool seam.
//!
//! Enrollment never touches a cryptographic library directly; it goes through
//! [`KeyTool`]. [`LocalKeyTool`] is the in-process default. Tests substitute
//! counting or failing implementations.

use crate::csr::build_csr;
use crate::error::CaError;
use crate::key::{ClientKey, SecretPem};

/// Local key operations needed to enroll a client.
pub trait KeyTool: Send + Sync {
    /// Generate a fresh private key, returned as SEC1 PEM.
    fn generate_key(&self) -> Result<SecretPem, CaError>;

    /// Build a CSR for `key_pem` whose subject common name is `domain`.
    fn generate_csr(&self, key_pem: &str, domain: &str) -> Result<String, CaError>;

    /// Re-encode `key_pem` as unencrypted PKCS#8 PEM.
    fn convert_key(&self, key_pem: &str) -> Result<SecretPem, CaError>;
}

/// [`KeyTool`] backed by `p256` and `rcgen`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalKeyTool;

impl LocalKeyTool {
    pub fn new() -> Self {
        Self
    }
}

impl KeyTool for LocalKeyTool {
    fn generate_key(&self) -> Result<SecretPem, CaError> {
        ClientKey::generate().to_sec1_pem()
    }

    fn generate_csr(&self, key_pem: &str, domain: &str) -> Result<String, CaError> {
        let key = ClientKey::from_pem(key_pem)?;
        build_csr(&key, domain)
    }

    fn convert_key(&self, key_pem: &str) -> Result<SecretPem, CaError> {
        ClientKey::from_pem(key_pem)?.to_pkcs8_pem()
    }
}
