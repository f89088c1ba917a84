use std::time::Duration;
use thiserror::Error;

use crate::item::ItemId;

pub type Result<T> = std::result::Result<T, StoryError>;

#[derive(Debug, Clone, Error)]
pub enum StoryError {
    /// The ranked ID list could not be obtained. Fatal for one fetch.
    #[error("Failed to load top stories: {0}")]
    SourceList(String),

    /// A single item lookup failed. The ID is dropped.
    #[error("Failed to fetch item {id}: {reason}")]
    ItemFetch { id: ItemId, reason: String },

    /// A single item lookup ran past its deadline.
    #[error("Fetching item {id} timed out after {after:?}")]
    Timeout { id: ItemId, after: Duration },

    /// URL or payload parsing errors
    #[error("Parse Error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    Config(String),
}

impl From<url::ParseError> for StoryError {
    fn from(err: url::ParseError) -> Self {
        StoryError::Parse(format!("URL parse error: {}", err))
    }
}

impl StoryError {
    /// Whether the error is expected per-item noise rather than a sign the source is broken.
    pub fn is_recoverable(&self) -> bool {
        match self {
            StoryError::SourceList(_) => false, // no ranking, nothing to fetch
            StoryError::ItemFetch { .. } => true,
            StoryError::Timeout { .. } => true,
            StoryError::Parse(_) => true, // host is left empty
            StoryError::Config(_) => false,
        }
    }

    /// Builds an `ItemFetch` error from any displayable cause.
    pub fn item_fetch(id: ItemId, reason: impl std::fmt::Display) -> Self {
        StoryError::ItemFetch {
            id,
            reason: reason.to_string(),
        }
    }
}
