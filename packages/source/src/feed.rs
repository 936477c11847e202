//! HTTP implementation of [`IncidentFeed`].

use std::time::Duration;

use async_trait::async_trait;

use crate::{IncidentFeed, SourceError, retry};

/// User agent sent with every upstream request. Some partner feeds
/// reject requests without a browser-like agent.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Default bound on a single upstream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches the feed with a plain HTTP GET against a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    /// Creates a feed for `url` whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl IncidentFeed for HttpFeed {
    fn describe(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<serde_json::Value, SourceError> {
        log::debug!("GET {}", self.url);
        retry::send_json(|| self.client.get(&self.url)).await
    }
}
