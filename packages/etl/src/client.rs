//! Production `PageSource` implementations.
//!
//! [`HttpPageSource`] wraps `reqwest` with a per-request timeout, optional
//! bearer auth, and retry with error classification. [`RateLimitedSource`]
//! wraps any source with a governor rate limiter for upstreams with strict
//! request quotas.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EtlError, Result};
use crate::traits::PageSource;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How transient failures are retried.
///
/// Network errors, timeouts, HTTP 429 and 5xx are retried with exponential
/// backoff; any other failure surfaces immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// HTTP `PageSource` backed by `reqwest`.
pub struct HttpPageSource {
    client: reqwest::Client,
    bearer: Option<String>,
    retry: RetryPolicy,
}

impl Default for HttpPageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPageSource {
    /// Create a source with the default timeout and retry policy.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            bearer: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Use a custom `reqwest` client (timeouts, proxies, user agent).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn try_get(&self, url: &str) -> Result<Value> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EtlError::Timeout {
                    url: url.to_string(),
                }
            } else {
                EtlError::Http(Box::new(e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Upstream {
                status: Some(status.as_u16()),
                message: snippet(&body),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| EtlError::Http(Box::new(e)))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.try_get(url).await {
                Ok(value) => {
                    debug!(url = %url, "page fetched");
                    return Ok(value);
                }
                Err(err) if is_retryable(&err) && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether a failure is worth another attempt.
fn is_retryable(err: &EtlError) -> bool {
    match err {
        EtlError::Timeout { .. } | EtlError::Http(_) => true,
        EtlError::Upstream {
            status: Some(status),
            ..
        } => is_retryable_status(*status),
        _ => false,
    }
}

/// 429 and server errors are transient; other statuses are not.
fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// First line of an error body, bounded, for log-safe messages.
fn snippet(body: &str) -> String {
    let line = body.lines().next().unwrap_or_default();
    if line.chars().count() > 300 {
        let truncated: String = line.chars().take(300).collect();
        format!("{truncated}...")
    } else {
        line.to_string()
    }
}

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A `PageSource` wrapper that enforces a request rate limit.
pub struct RateLimitedSource<S: PageSource> {
    inner: S,
    limiter: Arc<DefaultRateLimiter>,
}

impl<S: PageSource> RateLimitedSource<S> {
    /// Cap the wrapped source at `requests_per_second`.
    pub fn new(source: S, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"),
        );
        Self {
            inner: source,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<S: PageSource> PageSource for RateLimitedSource<S> {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.limiter.until_ready().await;
        self.inner.get_json(url).await
    }
}

/// Extension trait for easy rate limiting.
pub trait SourceExt: PageSource + Sized {
    /// Wrap this source with a per-second rate limit.
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedSource<Self> {
        RateLimitedSource::new(self, requests_per_second)
    }
}

impl<S: PageSource + Sized> SourceExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSource;
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn test_retryable_status_classification() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn test_envelope_errors_are_not_retryable() {
        assert!(!is_retryable(&EtlError::upstream("bad token")));
        assert!(!is_retryable(&EtlError::Envelope {
            reason: "no data".into()
        }));
        assert!(is_retryable(&EtlError::Timeout {
            url: "https://x".into()
        }));
        assert!(is_retryable(&EtlError::Upstream {
            status: Some(503),
            message: "unavailable".into(),
        }));
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay(0), Duration::from_millis(100));
        assert_eq!(retry.delay(1), Duration::from_millis(200));
        assert_eq!(retry.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let body = "x".repeat(500);
        let s = snippet(&body);
        assert!(s.len() <= 303);
        assert!(s.ends_with("..."));
    }

    #[tokio::test]
    async fn test_rate_limited_source_spaces_requests() {
        let mock = MockSource::new()
            .with_page(json!({"data": [], "paging": {}}))
            .with_page(json!({"data": [], "paging": {}}))
            .with_page(json!({"data": [], "paging": {}}));

        let source = mock.rate_limited(2);

        let start = Instant::now();
        for _ in 0..3 {
            source.get_json("https://example.com").await.unwrap();
        }
        let elapsed = start.elapsed();

        // 3 requests at 2/sec: first immediate, the rest wait
        assert!(
            elapsed.as_millis() >= 500,
            "rate limiting not applied: {elapsed:?}"
        );
    }
}
