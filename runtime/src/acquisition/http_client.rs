//! Async HTTP client wrapping reqwest.
//!
//! Handles redirects, timeouts, per-client request pacing, an optional body
//! size cap, retry with exponential backoff on transport errors and 5xx, and
//! `Retry-After` backoff on 429.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};

use super::rate_limit::IntervalLimiter;
use crate::config::RetryPolicy;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/120.0.0.0 Safari/537.36";

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
                            image/avif,image/webp,image/apng,*/*;q=0.8";

/// Longest `Retry-After` we are willing to honour.
const MAX_RETRY_AFTER_SECS: u64 = 10;

/// Errors surfaced by [`HttpClient`].
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} body exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client for sitemap, page and image acquisition.
///
/// Cheap to clone; clones share the connection pool and the limiter.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    limiter: Arc<IntervalLimiter>,
    max_body_bytes: Option<usize>,
}

impl HttpClient {
    /// Create a client with browser-like default headers.
    ///
    /// `interval` is the minimum spacing between requests issued through this
    /// client and its clones.
    pub fn new(timeout: Duration, retry: RetryPolicy, interval: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            retry,
            limiter: Arc::new(IntervalLimiter::new(interval)),
            max_body_bytes: None,
        })
    }

    /// Reject response bodies larger than `limit` bytes, without retrying.
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// GET `url`, retrying transient failures.
    ///
    /// Any non-2xx status left after retries is an error.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.wait().await;

            let result = match self.client.get(url).send().await {
                Ok(mut r) => {
                    let status = r.status().as_u16();

                    if (status >= 500 || status == 429) && attempt < max_attempts {
                        let delay = if status == 429 {
                            retry_after(&r).unwrap_or_else(|| self.retry.delay_for(attempt))
                        } else {
                            self.retry.delay_for(attempt)
                        };
                        tracing::warn!(
                            "{url} returned HTTP {status}, retrying in {:.1}s (attempt {attempt}/{max_attempts})",
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if !r.status().is_success() {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }

                    let content_type = r
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string());

                    let body = match self.max_body_bytes {
                        None => r.bytes().await.map(|b| b.to_vec()),
                        Some(limit) => {
                            let too_large = || FetchError::TooLarge {
                                url: url.to_string(),
                                limit,
                            };
                            if r.content_length().is_some_and(|len| len > limit as u64) {
                                return Err(too_large());
                            }
                            let mut body = Vec::new();
                            loop {
                                match r.chunk().await {
                                    Ok(Some(chunk)) => {
                                        if body.len() + chunk.len() > limit {
                                            return Err(too_large());
                                        }
                                        body.extend_from_slice(&chunk);
                                    }
                                    Ok(None) => break Ok(body),
                                    Err(e) => break Err(e),
                                }
                            }
                        }
                    };

                    body.map(|body| HttpResponse {
                        status,
                        content_type,
                        body,
                    })
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "request to {url} failed ({e}), retrying in {:.1}s (attempt {attempt}/{max_attempts})",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    /// GET `url` and decode the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.get(url).await?.text())
    }

    /// GET `url` and return the raw body with its content type.
    pub async fn get_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let resp = self.get(url).await?;
        Ok((resp.body, resp.content_type))
    }
}

fn retry_after(r: &reqwest::Response) -> Option<Duration> {
    r.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}
