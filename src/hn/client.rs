//! reqwest-backed `ItemSource` for the public Hacker News Firebase API.

use super::{HnItem, ItemSource};
use crate::error::{Result, StoryError};
use crate::item::ItemId;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const TOP_STORIES_ENDPOINT: &str = "topstories.json";

#[derive(Debug, Clone)]
pub struct HnClient {
    client: Client,
    base_url: String,
}

impl HnClient {
    /// Creates a client against `base_url` whose requests give up after `request_timeout`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent("quiet_hn/0.1")
            .build()
            .map_err(|e| StoryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn item_url(&self, id: ItemId) -> String {
        format!("{}/item/{}.json", self.base_url, id)
    }
}

#[async_trait]
impl ItemSource for HnClient {
    async fn list_top_ids(&self) -> Result<Vec<ItemId>> {
        let url = format!("{}/{}", self.base_url, TOP_STORIES_ENDPOINT);
        debug!("Requesting top story IDs from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoryError::SourceList(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StoryError::SourceList(format!(
                "HN API error {}",
                response.status()
            )));
        }

        let ids: Vec<ItemId> = response
            .json()
            .await
            .map_err(|e| StoryError::SourceList(format!("bad top stories payload: {}", e)))?;

        debug!("Received {} ranked IDs", ids.len());
        Ok(ids)
    }

    async fn fetch_item(&self, id: ItemId) -> Result<HnItem> {
        let response = self
            .client
            .get(self.item_url(id))
            .send()
            .await
            .map_err(|e| StoryError::item_fetch(id, e))?;

        if !response.status().is_success() {
            return Err(StoryError::item_fetch(
                id,
                format!("HN API error {}", response.status()),
            ));
        }

        // Unknown IDs come back as a literal `null`.
        let item: Option<HnItem> = response
            .json()
            .await
            .map_err(|e| StoryError::item_fetch(id, e))?;

        item.ok_or_else(|| StoryError::item_fetch(id, "item not found"))
    }
}
