use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::models::HnItem;

/// The listing call failed; nothing can be processed this run.
#[derive(Debug, Error)]
#[error("story source unavailable: {reason}")]
pub struct SourceUnavailable {
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait StorySource: Send + Sync {
    /// Ordered ids of the current top stories, at most `limit` of them.
    async fn top_story_ids(&self, limit: usize) -> Result<Vec<i64>, SourceUnavailable>;

    /// Metadata for a single item; `None` when the source has no such item.
    async fn item(&self, id: i64) -> Result<Option<HnItem>>;
}

pub struct HackerNewsClient {
    client: Client,
    base_url: String,
}

impl HackerNewsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StorySource for HackerNewsClient {
    async fn top_story_ids(&self, limit: usize) -> Result<Vec<i64>, SourceUnavailable> {
        let url = format!("{}/topstories.json", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceUnavailable::new(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceUnavailable::new(format!(
                "{url} returned {status}"
            )));
        }

        let mut ids = response
            .json::<Vec<i64>>()
            .await
            .map_err(|e| SourceUnavailable::new(format!("invalid listing from {url}: {e}")))?;

        ids.truncate(limit);
        Ok(ids)
    }

    async fn item(&self, id: i64) -> Result<Option<HnItem>> {
        let url = format!("{}/item/{}.json", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch item {id}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Hacker News API returned error for item {}: {}", id, status);
        }

        // The API answers `null` for ids it does not know.
        let item = response
            .json::<Option<HnItem>>()
            .await
            .with_context(|| format!("Failed to parse item {id}"))?;

        Ok(item)
    }
}
