// src/cache.rs
//! Time-bounded cache of the ranked story list.
//!
//! Readers share a short read lock on the current entry. A caller that finds
//! the entry expired queues on the refresh gate; whoever gets there first
//! fetches (holding no entry lock) and installs, and the rest reuse that
//! result, or its error if it failed. Installs always replace the entry
//! wholesale.

use crate::{
    error::{Result, StoryError},
    item::Item,
    pipeline::FetchPipeline,
    refresher::{Refresher, RefresherHandle},
};
use log::{debug, info, warn};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};

/// Longest accepted validity window.
pub const MAX_CACHE_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for the story cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Stories to compute per entry
    pub num_stories: usize,
    /// How long an entry stays valid
    pub duration: Duration,
    /// How much earlier than expiry the background refresh fires
    pub refresh_skew: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_stories: 30,
            duration: Duration::from_secs(300),
            refresh_skew: Duration::from_secs(5),
        }
    }
}

/// One computed story list and when it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Arc<[Item]>,
    pub expires_at: Instant,
    /// The count the list was computed for; `items` is shorter only if the ranking ran out.
    pub num_stories: usize,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Cache counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries installed, from either path
    pub installs: u64,
    pub failed_refreshes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outcome of the last fetch run under the refresh gate.
#[derive(Debug, Default)]
struct FetchRecord {
    last_error: Option<StoryError>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    installs: AtomicU64,
    failed_refreshes: AtomicU64,
}

pub struct ItemCache {
    pipeline: FetchPipeline,
    config: CacheConfig,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    refresh_gate: Mutex<FetchRecord>,
    /// Bumped under the gate each time a fetch finishes
    fetch_generation: AtomicU64,
    counters: Counters,
}

impl fmt::Debug for ItemCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemCache")
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish()
    }
}

impl ItemCache {
    pub fn new(pipeline: FetchPipeline, config: CacheConfig) -> Self {
        info!(
            "Initializing story cache ({} stories, valid for {}s)",
            config.num_stories,
            config.duration.as_secs()
        );
        Self {
            pipeline,
            config,
            entry: RwLock::new(None),
            refresh_gate: Mutex::new(FetchRecord::default()),
            fetch_generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Interval at which the background refresher should run.
    pub fn refresh_interval(&self) -> Duration {
        self.config.duration.saturating_sub(self.config.refresh_skew)
    }

    /// Returns the cached stories, fetching them first if the entry has expired.
    ///
    /// A failed fetch leaves any existing entry in place and returns the error;
    /// expired stories are never served.
    pub async fn items(&self) -> Result<Arc<[Item]>> {
        if let Some(items) = self.fresh_items().await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(items);
        }

        let observed = self.fetch_generation.load(Ordering::Acquire);
        let mut record = self.refresh_gate.lock().await;
        // Someone else may have installed while we queued.
        if let Some(items) = self.fresh_items().await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(items);
        }
        // ...or failed, in which case we report that failure rather than repeat it.
        if self.fetch_generation.load(Ordering::Acquire) != observed {
            if let Some(e) = &record.last_error {
                debug!("Sharing failure of the fetch we queued behind: {}", e);
                return Err(e.clone());
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Story cache expired, fetching synchronously");
        self.fetch_and_install(&mut record).await
    }

    /// Recomputes the list and installs it regardless of freshness.
    ///
    /// Shares the refresh gate with `items()`, so an expired reader waits for
    /// this fetch instead of starting its own.
    pub async fn refresh(&self) -> Result<Arc<[Item]>> {
        let mut record = self.refresh_gate.lock().await;
        self.fetch_and_install(&mut record).await
    }

    /// `record` is the held refresh gate.
    async fn fetch_and_install(&self, record: &mut FetchRecord) -> Result<Arc<[Item]>> {
        let result = match self.pipeline.fetch(self.config.num_stories).await {
            Ok(items) => Ok(self.install(items).await),
            Err(e) => {
                self.counters.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!("Refresh failed, keeping previous entry: {}", e);
                Err(e)
            }
        };
        record.last_error = result.as_ref().err().cloned();
        self.fetch_generation.fetch_add(1, Ordering::Release);
        result
    }

    /// Replaces the current entry; the new one expires `duration` from now.
    pub async fn install(&self, items: Vec<Item>) -> Arc<[Item]> {
        let items: Arc<[Item]> = items.into();
        let entry = Arc::new(CacheEntry {
            items: items.clone(),
            expires_at: expiry_after(Instant::now(), self.config.duration),
            num_stories: self.config.num_stories,
        });

        *self.entry.write().await = Some(entry);
        self.counters.installs.fetch_add(1, Ordering::Relaxed);
        info!("Installed {} stories into cache", items.len());
        items
    }

    /// The current entry, fresh or not, without fetching.
    pub async fn snapshot(&self) -> Option<Arc<CacheEntry>> {
        self.entry.read().await.clone()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            installs: self.counters.installs.load(Ordering::Relaxed),
            failed_refreshes: self.counters.failed_refreshes.load(Ordering::Relaxed),
        }
    }

    /// Launches the background refresher for this cache.
    pub fn start_refresher(self: &Arc<Self>) -> RefresherHandle {
        Refresher::spawn(self.clone(), self.refresh_interval())
    }

    async fn fresh_items(&self) -> Option<Arc<[Item]>> {
        let guard = self.entry.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.items.clone())
    }
}

/// `now + duration`, clamped to `MAX_CACHE_DURATION` so it cannot overflow.
fn expiry_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration.min(MAX_CACHE_DURATION))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::StoryError, pipeline::PipelineConfig, testing::MockItemSource};
    use pretty_assertions::assert_eq;

    const DURATION: Duration = Duration::from_secs(300);

    fn cache_over(source: Arc<MockItemSource>, num_stories: usize) -> ItemCache {
        ItemCache::new(
            FetchPipeline::new(source, PipelineConfig::default()),
            CacheConfig {
                num_stories,
                duration: DURATION,
                refresh_skew: Duration::from_secs(5),
            },
        )
    }

    fn source_of(ids: std::ops::RangeInclusive<u64>) -> Arc<MockItemSource> {
        Arc::new(MockItemSource::from_items(ids.map(MockItemSource::story).collect()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_within_duration() {
        let source = source_of(1..=5);
        let cache = cache_over(source.clone(), 3);

        let first = cache.items().await.unwrap();
        tokio::time::advance(DURATION - Duration::from_secs(1)).await;
        let second = cache.items().await.unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.list_calls(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_once_after_expiry() {
        let source = source_of(1..=5);
        let cache = cache_over(source.clone(), 3);

        cache.items().await.unwrap();
        tokio::time::advance(DURATION).await;
        source.set_ranking(vec![5, 4, 3, 2, 1]);
        let refreshed = cache.items().await.unwrap();
        let again = cache.items().await.unwrap();

        let ids: Vec<_> = refreshed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert!(Arc::ptr_eq(&refreshed, &again));
        assert_eq!(source.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_entry_and_errors() {
        let source = source_of(1..=5);
        let cache = cache_over(source.clone(), 3);

        let original = cache.items().await.unwrap();
        tokio::time::advance(DURATION).await;
        source.fail_list("ranking unavailable");

        let err = cache.items().await.unwrap_err();
        assert!(matches!(err, StoryError::SourceList(_)));

        let kept = cache.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&kept.items, &original));
        assert_eq!(cache.stats().failed_refreshes, 1);

        source.restore_list();
        assert_eq!(cache.items().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cold_cache_failure() {
        let source = source_of(1..=5);
        source.fail_list("down");
        let cache = cache_over(source, 3);

        assert!(cache.items().await.is_err());
        assert!(cache.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_fetch() {
        let source = Arc::new(
            MockItemSource::from_items((1..=10).map(MockItemSource::story).collect())
                .with_list_latency(Duration::from_millis(100))
                .with_latency(5, 50),
        );
        let cache = Arc::new(cache_over(source.clone(), 5));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.items().await })
            })
            .collect();

        let mut results = Vec::new();
        for caller in callers {
            results.push(caller.await.unwrap().unwrap());
        }

        assert_eq!(source.list_calls(), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_replaces_entry() {
        let source = source_of(1..=5);
        let cache = cache_over(source.clone(), 3);

        let installed = cache.install(vec![]).await;
        assert!(installed.is_empty());
        let entry = cache.snapshot().await.unwrap();
        assert_eq!(entry.num_stories, 3);
        assert!(entry.is_fresh(Instant::now()));
        assert!(!entry.is_fresh(Instant::now() + DURATION));

        // A fresh install is served without fetching.
        assert!(cache.items().await.unwrap().is_empty());
        assert_eq!(source.list_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ignores_freshness() {
        let source = source_of(1..=5);
        let cache = cache_over(source.clone(), 2);

        let first = cache.items().await.unwrap();
        source.set_ranking(vec![4, 5]);
        let refreshed = cache.refresh().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert!(Arc::ptr_eq(&cache.items().await.unwrap(), &refreshed));
        assert_eq!(source.list_calls(), 2);
        assert_eq!(cache.stats().installs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_share_one_fetch() {
        let source = Arc::new(
            MockItemSource::from_items((1..=10).map(MockItemSource::story).collect())
                .with_list_latency(Duration::from_millis(100)),
        );
        source.fail_list("down");
        let cache = Arc::new(cache_over(source.clone(), 5));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.items().await })
            })
            .collect();
        for caller in callers {
            let err = caller.await.unwrap().unwrap_err();
            assert!(matches!(err, StoryError::SourceList(_)));
        }
        assert_eq!(source.list_calls(), 1);
        assert_eq!(cache.stats().failed_refreshes, 1);

        // A caller arriving after the failure tries again.
        source.restore_list();
        assert_eq!(cache.items().await.unwrap().len(), 5);
        assert_eq!(source.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_on_expired_cache() {
        let source = Arc::new(
            MockItemSource::from_items((1..=10).map(MockItemSource::story).collect())
                .with_list_latency(Duration::from_millis(100)),
        );
        let cache = Arc::new(cache_over(source.clone(), 5));
        let stale = cache.items().await.unwrap();
        tokio::time::advance(DURATION).await;

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.items().await })
            })
            .collect();
        let mut results = Vec::new();
        for caller in callers {
            results.push(caller.await.unwrap().unwrap());
        }

        assert_eq!(source.list_calls(), 2);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert!(!Arc::ptr_eq(&results[0], &stale));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_duration_does_not_overflow() {
        let source = source_of(1..=5);
        let cache = ItemCache::new(
            FetchPipeline::new(source.clone(), PipelineConfig::default()),
            CacheConfig {
                num_stories: 3,
                duration: Duration::from_secs(u64::MAX),
                refresh_skew: Duration::from_secs(5),
            },
        );

        cache.items().await.unwrap();
        tokio::time::advance(Duration::from_secs(30 * 24 * 60 * 60)).await;
        cache.items().await.unwrap();

        assert_eq!(source.list_calls(), 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
