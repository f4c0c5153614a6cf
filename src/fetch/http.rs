// src/fetch/http.rs

use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::Fetcher;
use crate::config::Config;
use crate::error::{ConfigError, FetchError};

/// Fetches `<base><entity>` over HTTP(S) with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Url,
    raw_names: bool,
}

impl HttpFetcher {
    pub fn new(client: Client, base: Url) -> Self {
        Self {
            client,
            base,
            raw_names: false,
        }
    }

    /// Append names verbatim instead of percent-encoding them as one path segment.
    pub fn raw_names(mut self, raw: bool) -> Self {
        self.raw_names = raw;
        self
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("building HTTP client: {}", e)))?;
        Ok(Self::new(client, cfg.base()?).raw_names(cfg.raw_names))
    }

    /// Request URL for `entity`.
    pub fn url_for(&self, entity: &str) -> Result<String, FetchError> {
        if self.raw_names {
            return Ok(format!("{}{}", self.base, entity));
        }
        // URL parsing collapses "." and ".." even when percent-encoded, so
        // such a name can never be addressed as its own segment
        if entity == "." || entity == ".." {
            return Err(FetchError::Url {
                entity: entity.to_string(),
                message: "dot segment cannot name a page".into(),
            });
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Url {
                entity: entity.to_string(),
                message: format!("{} cannot take a path", self.base),
            })?
            .pop_if_empty()
            .push(entity);
        Ok(url.into())
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, entity: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(entity)?;
        debug!(%url, "GET");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        // non-success pages are searched like any other body
        let status = resp.status();
        if !status.is_success() {
            debug!(%url, %status, "non-success status");
        }

        let body = resp
            .bytes()
            .await
            .map_err(|source| FetchError::Body { url, source })?;
        Ok(body.to_vec())
    }
}
