//! Fetch pipeline: turns a ranking into `n` qualifying stories, in rank order.
//!
//! Each round fetches just enough IDs to cover what is still missing. Lookups
//! in a round run concurrently (bounded by a semaphore, each under its own
//! deadline), then outcomes are put back into rank order before filtering.

use crate::{
    error::{Result, StoryError},
    hn::ItemSource,
    item::{is_story_link, FetchOutcome, Item, ItemId, RankedId},
    utils::Timer,
};
use futures::{stream::FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{sync::Semaphore, time::timeout};

/// Configuration for item fan-out
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline for a single item lookup
    pub fetch_timeout: Duration,
    /// Upper bound on lookups in flight at once
    pub max_concurrent_fetches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_concurrent_fetches: 32,
        }
    }
}

pub struct FetchPipeline {
    source: Arc<dyn ItemSource>,
    semaphore: Arc<Semaphore>,
    fetch_timeout: Duration,
}

impl FetchPipeline {
    pub fn new(source: Arc<dyn ItemSource>, config: PipelineConfig) -> Self {
        Self {
            source,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            fetch_timeout: config.fetch_timeout,
        }
    }

    /// Returns up to `n` qualifying stories in the source's rank order.
    ///
    /// Fewer than `n` come back only when the ranking runs out. A failure to
    /// list the ranking fails the whole call; recoverable lookup failures are
    /// skipped, any other lookup failure fails the call.
    pub async fn fetch(&self, n: usize) -> Result<Vec<Item>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut timer = Timer::start("fetch top stories");
        let ids = self.source.list_top_ids().await?;
        timer.checkpoint("list top ids");

        let ranked = rank_unique(&ids);
        let mut stories: Vec<Item> = Vec::with_capacity(n.min(ranked.len()));
        let mut cursor = 0;
        let mut rounds = 0;

        while stories.len() < n && cursor < ranked.len() {
            let need = n - stories.len();
            // The ranking may hold fewer IDs than are still needed.
            let end = cursor.saturating_add(need).min(ranked.len());
            let batch = &ranked[cursor..end];
            rounds += 1;
            debug!(
                "Round {}: fetching IDs {}..{} ({} still needed)",
                rounds, cursor, end, need
            );

            for outcome in self.fetch_batch(batch).await {
                match outcome {
                    FetchOutcome::Success { item, .. } => {
                        if is_story_link(&item) {
                            stories.push(Item::from_hn(item));
                        }
                    }
                    FetchOutcome::Failure { error, rank } if error.is_recoverable() => {
                        warn!("Dropping rank {}: {}", rank, error);
                    }
                    // The source itself is broken, not just this item.
                    FetchOutcome::Failure { error, rank } => {
                        error!("Aborting fetch at rank {}: {}", rank, error);
                        return Err(error);
                    }
                }
            }
            cursor = end;
        }

        if stories.len() < n {
            info!(
                "Ranking exhausted after {} IDs with {}/{} stories",
                ranked.len(),
                stories.len(),
                n
            );
        }
        timer.checkpoint("fetch items");
        timer.finish();

        Ok(stories)
    }

    /// Fetches every ID in `batch` concurrently and returns outcomes sorted by rank.
    async fn fetch_batch(&self, batch: &[RankedId]) -> Vec<FetchOutcome> {
        let mut in_flight = FuturesUnordered::new();
        for ranked in batch {
            in_flight.push(self.fetch_one(*ranked));
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(FetchOutcome::rank);
        outcomes
    }

    async fn fetch_one(&self, RankedId { id, rank }: RankedId) -> FetchOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return FetchOutcome::Failure {
                    error: StoryError::item_fetch(id, e),
                    rank,
                }
            }
        };

        match timeout(self.fetch_timeout, self.source.fetch_item(id)).await {
            Ok(Ok(item)) => FetchOutcome::Success { item, rank },
            Ok(Err(error)) => FetchOutcome::Failure { error, rank },
            Err(_) => FetchOutcome::Failure {
                error: StoryError::Timeout {
                    id,
                    after: self.fetch_timeout,
                },
                rank,
            },
        }
    }
}

/// Tags each ID with its rank, keeping only the first occurrence of repeats.
fn rank_unique(ids: &[ItemId]) -> Vec<RankedId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .enumerate()
        .filter(|(_, id)| seen.insert(**id))
        .map(|(rank, id)| RankedId { id: *id, rank })
        .collect()
}
