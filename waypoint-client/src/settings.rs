//! Client settings.
//!
//! Layering, lowest to highest precedence:
//! 1. built-in defaults
//! 2. TOML file (`--config`, else `config.toml` in the platform config dir)
//! 3. environment (`WAYPOINT_*`)
//! 4. command-line flags (applied by the binary)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default timeout applied to every registry and CA request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout for registry requests and RPC channels.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_CACHE_ROOT: &str = "WAYPOINT_CACHE_ROOT";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "WAYPOINT_REQUEST_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "WAYPOINT_CONNECT_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "WAYPOINT_MAX_ATTEMPTS";

/// Runtime settings shared by every bootstrap component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of the credential cache (token files and `config/tls/...`)
    pub cache_root: PathBuf,
    /// Whole-request timeout for HTTP calls and RPCs
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Network retry policy (disabled by default)
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: std::env::temp_dir(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Opt-in retry with exponential backoff for network calls.
///
/// `max_attempts` counts the first try, so the default of 1 means no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default()
    }

    /// Retry up to `max_attempts` total attempts with the default backoff.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// On-disk representation of [`Settings`]. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    cache_root: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    #[serde(default)]
    retry: RetryFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryFile {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

/// Errors loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

impl Settings {
    /// Load defaults, then the settings file, then the process environment.
    ///
    /// An explicit `path` must exist; the default path is used only if present.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(|var| std::env::var(var).ok())
    }

    /// Platform config path, e.g. `~/.config/waypoint/config.toml` on Linux.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "waypoint", "waypoint")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Read a TOML settings file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse TOML settings on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: SettingsFile = toml::from_str(content)?;
        let mut settings = Self::default();

        if let Some(root) = file.cache_root {
            settings.cache_root = root;
        }
        if let Some(secs) = file.request_timeout_secs {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            settings.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.retry.max_attempts {
            settings.retry.max_attempts = n.max(1);
        }
        if let Some(ms) = file.retry.initial_backoff_ms {
            settings.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.retry.max_backoff_ms {
            settings.retry.max_backoff = Duration::from_millis(ms);
        }

        Ok(settings)
    }

    /// Apply `WAYPOINT_*` overrides read through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_CACHE_ROOT).filter(|v| !v.is_empty()) {
            self.cache_root = PathBuf::from(root);
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, ENV_CONNECT_TIMEOUT_SECS)? {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_env::<u32, _>(&lookup, ENV_MAX_ATTEMPTS)? {
            self.retry.max_attempts = n.max(1);
        }
        Ok(self)
    }

    /// Override the cache root.
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Override the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_env<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, SettingsError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::Env { var, value }),
    }
}
