use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::video::timeline::SourceLocation;

/// Loads the full byte content behind a clip's source location.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, location: &SourceLocation) -> Result<Bytes>;
}

/// Reads local files from disk and downloads remote ones with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpMediaFetcher {
    client: Client,
    api_key: Option<String>,
}

impl HttpMediaFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_key: None,
        }
    }

    /// Append `key=<api key>` to remote URLs; generated media is only
    /// downloadable with the key that created it.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn authorized_url(&self, url: &str) -> String {
        match &self.api_key {
            Some(key) if url.contains('?') => format!("{url}&key={key}"),
            Some(key) => format!("{url}?key={key}"),
            None => url.to_string(),
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, location: &SourceLocation) -> Result<Bytes> {
        match location {
            SourceLocation::Owned(path) | SourceLocation::File(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read clip media {}", path.display()))?;
                Ok(Bytes::from(data))
            }
            SourceLocation::Remote(url) => {
                let resp = self
                    .client
                    .get(self.authorized_url(url))
                    .send()
                    .await
                    .with_context(|| format!("Failed to download {url}"))?;

                if !resp.status().is_success() {
                    anyhow::bail!("Download of {} failed with status {}", url, resp.status());
                }

                resp.bytes()
                    .await
                    .with_context(|| format!("Failed to read response body from {url}"))
            }
        }
    }
}
