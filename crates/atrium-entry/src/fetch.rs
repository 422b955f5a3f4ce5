//! The asset fetcher seam.

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

/// Fetches remote text assets (markup, scripts, stylesheets).
///
/// The runtime only ever goes through this trait, so tests can substitute a
/// canned fetcher and never touch the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the asset at `url` as text.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Production fetcher backed by a shared HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Fetcher with a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher over an existing client, sharing its connection pool.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetching asset");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::transport(url, e))
    }
}
