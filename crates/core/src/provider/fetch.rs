//! Bounded HTTP downloads for feed documents and .torrent payloads.

use std::time::Duration;

use reqwest::{Client, Proxy};
use tracing::debug;

use super::types::ProviderError;

/// Largest body accepted from a feed or payload URL.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// A reqwest client with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u32) -> Result<Self, ProviderError> {
        Self::with_proxy(timeout_secs, None)
    }

    /// Route HTTP and HTTPS requests through `proxy` when given.
    pub fn with_proxy(timeout_secs: u32, proxy: Option<&str>) -> Result<Self, ProviderError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs as u64))
            .user_agent(concat!("releasewatch/", env!("CARGO_PKG_VERSION")));
        if let Some(url) = proxy {
            let proxy = Proxy::all(url)
                .map_err(|e| ProviderError::Http(format!("invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            debug!(proxy = url, "Using proxy");
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url` and return the whole body.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_BODY_SIZE as u64)
        {
            return Err(ProviderError::ResponseTooLarge);
        }

        let bytes = response.bytes().await.map_err(ProviderError::from_reqwest)?;
        if bytes.len() > MAX_BODY_SIZE {
            return Err(ProviderError::ResponseTooLarge);
        }
        debug!(url = url, size = bytes.len(), "Downloaded");
        Ok(bytes.to_vec())
    }
}
