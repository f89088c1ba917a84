//! Item model shared by the pipeline and the cache.
//!
//! `Item` is what callers see: an immutable story with its host already
//! derived. `RankedId` and `FetchOutcome` only live inside one pipeline run.

use crate::error::StoryError;
use crate::hn::HnItem;
use log::debug;
use serde::Serialize;
use url::Url;

pub type ItemId = u64;

/// The only item type that is ever shown.
pub const STORY_TYPE: &str = "story";

/// A qualifying story, ready to be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: String,
    pub title: String,
    pub url: String,
    pub by: String,
    pub score: i64,
    /// Hostname of `url` without a leading `www.`; empty when it cannot be parsed.
    pub host: String,
}

impl Item {
    /// Builds an item from its wire form, deriving the host.
    pub fn from_hn(hn: HnItem) -> Self {
        let url = hn.url.unwrap_or_default();
        let host = derive_host(&url);
        Self {
            id: hn.id,
            kind: hn.kind,
            title: hn.title.unwrap_or_default(),
            url,
            by: hn.by.unwrap_or_default(),
            score: hn.score.unwrap_or(0),
            host,
        }
    }
}

/// True for items of type "story" that link somewhere.
pub fn is_story_link(item: &HnItem) -> bool {
    item.kind == STORY_TYPE && item.url.as_deref().map_or(false, |u| !u.is_empty())
}

/// Parses the hostname out of `raw`, stripping one leading `www.`.
pub fn parse_host(raw: &str) -> Result<String, StoryError> {
    let parsed = Url::parse(raw)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| StoryError::Parse(format!("URL has no host: {}", raw)))?;
    // IPv6 literals come back bracketed
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Like [`parse_host`], but absorbs the error into an empty host.
pub fn derive_host(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    match parse_host(raw) {
        Ok(host) => host,
        Err(e) => {
            debug!("Leaving host empty for '{}': {}", raw, e);
            String::new()
        }
    }
}

/// An identifier and its position in the ranked list it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedId {
    pub id: ItemId,
    pub rank: usize,
}

/// Result of one concurrent item lookup, tagged with its global rank.
#[derive(Debug)]
pub enum FetchOutcome {
    Success { item: HnItem, rank: usize },
    Failure { error: StoryError, rank: usize },
}

impl FetchOutcome {
    pub fn rank(&self) -> usize {
        match self {
            FetchOutcome::Success { rank, .. } | FetchOutcome::Failure { rank, .. } => *rank,
        }
    }
}
