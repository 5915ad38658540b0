//! HTTP transport.
//!
//! The engine only needs plain `GET`s, so the transport is abstracted behind
//! [`HttpClient`]. [`ReqwestHttpClient`] is the production implementation;
//! tests plug in scripted clients.

use crate::config::{HttpConfig, RetryConfig};
use crate::error::{DiamondError, DiamondResult};
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

/// A response to a `GET` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keyed by lower-cased name.
    pub headers: HashMap<String, String>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response without headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations must be safe to call concurrently. A response with any
/// status is `Ok`; `Err` is reserved for failures to obtain a response.
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a `GET` request with query parameters.
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> impl Future<Output = DiamondResult<HttpResponse>> + Send;
}

/// [`HttpClient`] backed by `reqwest`.
///
/// Connection failures and timeouts are retried with backoff up to
/// `retry.max_attempts` attempts; statuses are returned as-is.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl ReqwestHttpClient {
    /// Builds a client from transport settings.
    pub fn new(config: &HttpConfig) -> DiamondResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DiamondError::transport_fatal(format!("build http client: {}", e)))?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
        })
    }

    async fn get_once(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> DiamondResult<HttpResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            }

            match self.get_once(url, query).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retryable = e.is_connect() || e.is_timeout();
                    if retryable && attempt + 1 < max_attempts {
                        debug!(url, attempt, error = %e, "retrying request");
                        attempt += 1;
                        continue;
                    }
                    return Err(DiamondError::Transport {
                        message: format!("GET {}: {}", url, e),
                        retryable,
                    });
                }
            }
        }
    }
}
