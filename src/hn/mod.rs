//! The remote ranking/lookup capability the pipeline consumes.

pub mod client;

pub use client::HnClient;

use crate::error::Result;
use crate::item::ItemId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Wire representation of an item as the HN API returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnItem {
    pub id: ItemId,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub time: Option<i64>,
    /// Comment count
    #[serde(default)]
    pub descendants: Option<i64>,
}

/// Something that can rank item IDs and look items up one at a time.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Returns the currently top-ranked IDs, best first.
    async fn list_top_ids(&self) -> Result<Vec<ItemId>>;

    /// Looks up a single item.
    async fn fetch_item(&self, id: ItemId) -> Result<HnItem>;
}
