//! HTTPS manifest transport.
//!
//! Requires the `http-transport` feature. Redirects are not followed: a
//! manifest must be served from the URL it was requested at.

use crate::config::FinderConfig;
use crate::domain::ports::ManifestTransport;
use crate::error::{FinderError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpTransport {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &FinderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FinderError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: config.max_manifest_bytes,
        })
    }

    fn map_reqwest_error(url: &Url, e: reqwest::Error) -> FinderError {
        let reason = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        FinderError::Transport {
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ManifestTransport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FinderError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let too_large = || FinderError::DocumentTooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::map_reqwest_error(url, e))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        debug!(url = %url, bytes = body.len(), "manifest fetched");
        Ok(body)
    }
}
