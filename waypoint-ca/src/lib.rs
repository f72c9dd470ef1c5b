//! Cryptographic building blocks for waypoint certificate enrollment.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No logging
//!
//! Everything is expressed over PEM strings so callers decide where the
//! artifacts live. The enrollment driver in `waypoint-client` persists them
//! and talks to the remote certificate authority.
//!
//! # Example
//!
//! ```
//! use waypoint_ca::{inspect_csr, KeyTool, LocalKeyTool};
//!
//! let tool = LocalKeyTool::new();
//! let key = tool.generate_key().unwrap();
//! let csr = tool.generate_csr(&key, "auth.example.com").unwrap();
//!
//! let info = inspect_csr(&csr).unwrap();
//! assert_eq!(info.common_name.as_deref(), Some("auth.example.com"));
//! ```

pub mod cert;
pub mod csr;
mod error;
pub mod key;
mod tool;

pub use cert::{inspect_certificate, CertificateInfo, MAX_CERT_BUNDLE_SIZE, MAX_PEM_SIZE};
pub use csr::{build_csr, inspect_csr, CsrInfo};
pub use error::CaError;
pub use key::{ClientKey, SecretPem};
pub use tool::{KeyTool, LocalKeyTool};
