//! On-disk credential cache.
//!
//! Layout, keyed by domain:
//!
//! ```text
//! {root}/{domain}_token
//! {root}/config/tls/{domain}/ca.crt
//! {root}/config/tls/{domain}/client.key
//! {root}/config/tls/{domain}/client.csr
//! {root}/config/tls/{domain}/client.crt
//! {root}/config/tls/{domain}/client.pem
//! ```
//!
//! The token file doubles as the "trust already established" marker: when it
//! exists, bootstrap takes credential paths from the registry entry and skips
//! enrollment entirely, whatever the state of `config/tls/{domain}/`.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;

use crate::error::{BootstrapError, Result};

const TLS_SUBDIR: &str = "config/tls";
const LOCK_FILE: &str = ".lock";

/// Paths of the five artifacts enrollment produces for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundlePaths {
    pub dir: PathBuf,
    pub ca_cert: PathBuf,
    pub key: PathBuf,
    pub csr: PathBuf,
    pub cert: PathBuf,
    pub portable_key: PathBuf,
}

impl BundlePaths {
    fn new(dir: PathBuf) -> Self {
        Self {
            ca_cert: dir.join("ca.crt"),
            key: dir.join("client.key"),
            csr: dir.join("client.csr"),
            cert: dir.join("client.crt"),
            portable_key: dir.join("client.pem"),
            dir,
        }
    }

    /// All artifact paths in enrollment order.
    pub fn artifacts(&self) -> [&Path; 5] {
        [
            &self.key,
            &self.csr,
            &self.ca_cert,
            &self.cert,
            &self.portable_key,
        ]
    }
}

/// Filesystem convention for tokens and key material.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    root: PathBuf,
}

impl CredentialCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{domain}_token`
    pub fn token_path(&self, domain: &str) -> Result<PathBuf> {
        validate_domain(domain)?;
        Ok(self.root.join(format!("{domain}_token")))
    }

    /// Whether a token file exists for `domain`.
    pub fn has_token(&self, domain: &str) -> Result<bool> {
        Ok(self.token_path(domain)?.is_file())
    }

    /// Read the cached token for `domain`.
    ///
    /// Surrounding whitespace is dropped; a missing or blank file is `None`.
    pub fn read_token(&self, domain: &str) -> Result<Option<String>> {
        let path = self.token_path(domain)?;
        match std::fs::read_to_string(&path) {
            Ok(token) => {
                let token = token.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BootstrapError::fs(path, e)),
        }
    }

    /// Store `token` for `domain` with owner-only permissions.
    pub fn store_token(&self, domain: &str, token: &str) -> Result<PathBuf> {
        let path = self.token_path(domain)?;
        ensure_dir(&self.root)?;
        write_atomic(&path, token.as_bytes(), true)?;
        Ok(path)
    }

    /// `{root}/config/tls/{domain}`
    pub fn bundle_dir(&self, domain: &str) -> Result<PathBuf> {
        validate_domain(domain)?;
        Ok(self.root.join(TLS_SUBDIR).join(domain))
    }

    pub fn bundle_paths(&self, domain: &str) -> Result<BundlePaths> {
        Ok(BundlePaths::new(self.bundle_dir(domain)?))
    }

    /// Create the bundle directory for `domain` if needed.
    pub fn ensure_bundle_dir(&self, domain: &str) -> Result<BundlePaths> {
        let paths = self.bundle_paths(domain)?;
        ensure_dir(&paths.dir)?;
        Ok(paths)
    }

    /// Take the exclusive enrollment lock for `domain`, blocking until free.
    ///
    /// The lock is advisory (`flock` on Unix) and released when the guard drops.
    pub async fn lock_domain(&self, domain: &str) -> Result<DomainLock> {
        let paths = self.ensure_bundle_dir(domain)?;
        let path = paths.dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| BootstrapError::fs(&path, e))?;

        let file = if file.try_lock_exclusive().is_ok() {
            file
        } else {
            tracing::info!(domain, "Waiting for concurrent enrollment to finish");
            tokio::task::spawn_blocking(move || file.lock_exclusive().map(|()| file))
                .await
                .map_err(|e| BootstrapError::fs(&path, std::io::Error::other(e)))?
                .map_err(|e| BootstrapError::fs(&path, e))?
        };

        Ok(DomainLock { file, path })
    }

    /// Atomically write an artifact: temp file in the same directory, then rename.
    ///
    /// Readers never observe a half-written file. `secret` restricts the file
    /// to the owner on Unix.
    pub fn write_artifact(&self, path: &Path, contents: &[u8], secret: bool) -> Result<()> {
        write_atomic(path, contents, secret)
    }
}

/// Guard for [`CredentialCache::lock_domain`].
#[derive(Debug)]
pub struct DomainLock {
    file: File,
    path: PathBuf,
}

impl DomainLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DomainLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Reject domains that would escape the cache root when used as a path component.
fn validate_domain(domain: &str) -> Result<()> {
    let bad = domain.is_empty()
        || domain == "."
        || domain == ".."
        || domain.contains(['/', '\\', '\0']);
    if bad {
        return Err(BootstrapError::Parse(format!(
            "domain {domain:?} cannot be used as a cache key"
        )));
    }
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| BootstrapError::fs(dir, e))
}

fn write_atomic(path: &Path, contents: &[u8], secret: bool) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| BootstrapError::fs(path, std::io::Error::from(ErrorKind::InvalidInput)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| BootstrapError::fs(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| BootstrapError::fs(tmp.path(), e))?;

    // NamedTempFile is created 0600; widen public material to 0644.
    #[cfg(unix)]
    {
        if !secret {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
                .map_err(|e| BootstrapError::fs(tmp.path(), e))?;
        }
    }
    #[cfg(not(unix))]
    let _ = secret;

    tmp.persist(path)
        .map_err(|e| BootstrapError::fs(path, e.error))?;
    Ok(())
}
