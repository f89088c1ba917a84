//! Ranked story cache with concurrent fan-out retrieval.
//!
//! [`FetchPipeline`] turns a ranking into `n` qualifying stories in rank
//! order, [`ItemCache`] keeps the result for a bounded time, and the
//! [`refresher`] recomputes it in the background shortly before expiry.

pub mod cache;
pub mod config;
pub mod error;
pub mod hn;
pub mod item;
pub mod page;
pub mod pipeline;
pub mod refresher;
pub mod testing;
pub mod utils;

pub use cache::{CacheConfig, CacheEntry, CacheStats, ItemCache};
pub use config::Config;
pub use error::{Result, StoryError};
pub use hn::{HnClient, HnItem, ItemSource};
pub use item::{Item, ItemId};
pub use page::StoriesPage;
pub use pipeline::{FetchPipeline, PipelineConfig};
pub use refresher::{Refresher, RefresherHandle};

use std::sync::Arc;

/// Builds a cache over `source` as described by `config`.
pub fn build_cache(source: Arc<dyn ItemSource>, config: &Config) -> Arc<ItemCache> {
    let pipeline = FetchPipeline::new(source, config.pipeline_config());
    Arc::new(ItemCache::new(pipeline, config.cache_config()))
}

/// Startup hook: a cache over the HN API with its background refresher running.
///
/// Must be called from within a tokio runtime.
pub fn launch(config: &Config) -> Result<(Arc<ItemCache>, RefresherHandle)> {
    let client = HnClient::new(&config.api_base_url, config.fetch_timeout)?;
    let cache = build_cache(Arc::new(client), config);
    let refresher = cache.start_refresher();
    Ok((cache, refresher))
}
