//! Plain-HTTP access to the registry and CA endpoints.
//!
//! Every request is bounded by the configured timeout. Status codes are
//! always checked: a non-2xx answer is a [`BootstrapError::Network`], never a
//! body to persist.

use reqwest::StatusCode;

use crate::error::{BootstrapError, Result};
use crate::settings::{RetryPolicy, Settings};

/// HTTP client shared by the resolver and the CA client.
#[derive(Debug, Clone)]
pub struct RegistryHttp {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl RegistryHttp {
    /// Build a client honouring the timeouts and retry policy in `settings`.
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| BootstrapError::Network {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            retry: settings.retry,
        })
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Transient(e)) if attempt >= self.retry.max_attempts => return Err(e),
                Err(Failure::Transient(e)) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> std::result::Result<String, Failure> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Failure::Transient(network(url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = BootstrapError::Network {
                url: url.to_string(),
                reason: format!("status {status}: {}", truncate(body.trim(), 200)),
            };
            return Err(if is_retryable(status) {
                Failure::Transient(err)
            } else {
                Failure::Fatal(err)
            });
        }

        response
            .text()
            .await
            .map_err(|e| Failure::Transient(network(url, e)))
    }
}

enum Failure {
    Transient(BootstrapError),
    Fatal(BootstrapError),
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
}

fn network(url: &str, e: reqwest::Error) -> BootstrapError {
    let reason = if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    BootstrapError::Network {
        url: url.to_string(),
        reason,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_errors_are_retryable() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
