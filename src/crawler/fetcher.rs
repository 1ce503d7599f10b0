//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - GET requests for listing and detail pages
//! - Error classification into transient and permanent failures
//! - Retry with bounded exponential backoff

use crate::config::{Config, RetryConfig};
use crate::{FetchError, FetchResult};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Page body
    pub body: String,
}

/// How often and how patiently a request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,

    /// Shortest pause between attempts
    pub backoff_floor: Duration,

    /// Longest pause between attempts
    pub backoff_ceiling: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_floor: Duration::from_millis(config.backoff_floor_ms),
            backoff_ceiling: Duration::from_millis(config.backoff_ceiling_ms),
        }
    }

    /// Pause after the given failed attempt (1-based)
    ///
    /// # Backoff schedule (floor = 4s, ceiling = 10s)
    ///
    /// | Failed attempt | Pause |
    /// |----------------|-------|
    /// | 1 | 4s |
    /// | 2 | 8s |
    /// | 3+ | 10s |
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.backoff_floor.saturating_mul(1u32 << exponent);
        delay.clamp(self.backoff_floor, self.backoff_ceiling.max(self.backoff_floor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Builds an HTTP client with proper configuration
///
/// The per-request timeout comes from the config; cookies are not kept
/// between requests.
///
/// # Example
///
/// ```no_run
/// use bafa_harvest::config::Config;
/// use bafa_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.source.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL once and classifies the outcome
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx | `Ok(FetchedPage)` |
/// | 429 | `RateLimited` (transient) |
/// | 5xx | `ServerError` (transient) |
/// | other status | `Status` (permanent) |
/// | timeout | `Timeout` (transient) |
/// | connection/body error | `Network` (transient) |
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult<FetchedPage> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status = response.status();
    let final_url = response.url().to_string();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited {
            url: url.to_string(),
        });
    }

    if status.is_server_error() {
        return Err(FetchError::ServerError {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_error(url, e))?;

    Ok(FetchedPage {
        url: final_url,
        status_code: status.as_u16(),
        body,
    })
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            source: error,
        }
    }
}

/// Fetches a URL, retrying transient failures with exponential backoff
///
/// Permanent failures are returned as-is after the first attempt. Once the
/// attempt ceiling is reached the last transient error is wrapped in
/// [`FetchError::Exhausted`].
pub async fn fetch_with_policy(
    client: &Client,
    url: &str,
    policy: &RetryPolicy,
) -> FetchResult<FetchedPage> {
    let mut attempt = 1;

    loop {
        let err = match fetch_page(client, url).await {
            Ok(page) => {
                if attempt > 1 {
                    tracing::debug!("Fetched {} on attempt {}", url, attempt);
                }
                return Ok(page);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }

        if attempt >= policy.max_attempts {
            return Err(FetchError::Exhausted {
                url: url.to_string(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.backoff_delay(attempt);
        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient fetch error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
