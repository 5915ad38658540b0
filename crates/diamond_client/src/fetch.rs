//! Config-fetch seam.

use crate::error::{DiamondError, DiamondResult};
use crate::http::HttpClient;
use diamond_protocol::wire::{self, CONTENT_MD5_HEADER};
use diamond_protocol::{ConfigKey, ConfigValue, ProtocolError};
use std::future::Future;
use std::sync::Arc;

/// Fetches the current value of a key from one server.
///
/// Must be safe to call repeatedly and concurrently with resolver activity.
/// A configuration the server doesn't know is `Ok(ConfigValue::absent())`;
/// transport and protocol failures are [`DiamondError::FetchFailed`].
pub trait ConfigFetcher: Send + Sync + 'static {
    /// Fetches the value of `key` from `server`.
    fn fetch(
        &self,
        server: &str,
        key: &ConfigKey,
    ) -> impl Future<Output = DiamondResult<ConfigValue>> + Send;
}

/// [`ConfigFetcher`] speaking the Diamond HTTP protocol.
///
/// See [`diamond_protocol::wire`] for the request and response rules.
#[derive(Debug)]
pub struct HttpConfigFetcher<C: HttpClient> {
    client: Arc<C>,
}

impl<C: HttpClient> HttpConfigFetcher<C> {
    /// Creates a fetcher sharing an HTTP client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

impl<C: HttpClient> Clone for HttpConfigFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: HttpClient> ConfigFetcher for HttpConfigFetcher<C> {
    async fn fetch(&self, server: &str, key: &ConfigKey) -> DiamondResult<ConfigValue> {
        let url = wire::config_url(server);
        let query = wire::config_query(key);

        let response = self
            .client
            .get(&url, &query)
            .await
            .map_err(|e| DiamondError::FetchFailed {
                server: server.to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status;
        let content_md5 = response.header(CONTENT_MD5_HEADER).map(str::to_string);
        wire::decode_config_response(status, content_md5.as_deref(), response.body).map_err(|e| {
            let status = match e {
                ProtocolError::UnexpectedStatus { status } => Some(status),
                _ => None,
            };
            DiamondError::FetchFailed {
                server: server.to_string(),
                status,
                message: e.to_string(),
            }
        })
    }
}
