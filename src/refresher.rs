//! Background task that recomputes the story list ahead of cache expiry.

use crate::{
    cache::{ItemCache, MAX_CACHE_DURATION},
    error::Result,
    utils::Timer,
};
use log::{error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

/// Handle to a running refresher. Dropping it also stops the task.
#[must_use = "dropping the handle stops the refresher"]
pub struct RefresherHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Signals the refresher to stop and waits for it to exit.
    pub async fn shutdown(self) {
        // Fails only if the task already exited.
        self.shutdown_tx.send(true).ok();
        if let Err(e) = self.task.await {
            error!("Refresher task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct Refresher {
    cache: Arc<ItemCache>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Refresher {
    /// Starts refreshing `cache` immediately and then every `every`.
    pub fn spawn(cache: Arc<ItemCache>, every: Duration) -> RefresherHandle {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let refresher = Refresher {
            cache,
            // tokio's interval panics on zero and overflows on huge periods
            interval: every.clamp(Duration::from_millis(1), MAX_CACHE_DURATION),
            shutdown,
        };
        RefresherHandle {
            shutdown_tx,
            task: tokio::spawn(refresher.run()),
        }
    }

    async fn run(self) {
        let Refresher {
            cache,
            interval: every,
            mut shutdown,
        } = self;
        info!("Refreshing stories every {}s", every.as_secs_f64());

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            cycle += 1;

            tokio::select! {
                result = refresh_once(&cache) => match result {
                    Ok(count) => info!("Refresh #{} installed {} stories", cycle, count),
                    Err(e) => warn!("Refresh #{} failed, keeping current entry: {}", cycle, e),
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Refresher stopped after {} cycles", cycle);
    }
}

async fn refresh_once(cache: &ItemCache) -> Result<usize> {
    let timer = Timer::start("background refresh");
    let installed = cache.refresh().await?;
    timer.finish();
    Ok(installed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CacheConfig,
        pipeline::{FetchPipeline, PipelineConfig},
        testing::MockItemSource,
    };

    const DURATION: Duration = Duration::from_secs(300);
    const SKEW: Duration = Duration::from_secs(5);

    fn setup() -> (Arc<MockItemSource>, Arc<ItemCache>) {
        let source = Arc::new(MockItemSource::from_items(
            (1..=5).map(MockItemSource::story).collect(),
        ));
        let cache = Arc::new(ItemCache::new(
            FetchPipeline::new(source.clone(), PipelineConfig::default()),
            CacheConfig {
                num_stories: 3,
                duration: DURATION,
                refresh_skew: SKEW,
            },
        ));
        (source, cache)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_before_expiry() {
        let (source, cache) = setup();
        let handle = cache.start_refresher();

        wait_until(|| cache.stats().installs == 1).await;
        let first = cache.snapshot().await.unwrap();

        tokio::time::advance(DURATION - SKEW - Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.stats().installs, 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        wait_until(|| cache.stats().installs == 2).await;
        let second = cache.snapshot().await.unwrap();
        assert_eq!(second.expires_at - first.expires_at, DURATION - SKEW);

        // At the nominal expiry of the first entry, readers still hit.
        tokio::time::advance(SKEW).await;
        cache.items().await.unwrap();
        assert_eq!(source.list_calls(), 2);
        assert_eq!(cache.stats().misses, 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_running() {
        let (source, cache) = setup();
        let handle = cache.start_refresher();
        wait_until(|| cache.stats().installs == 1).await;
        let original = cache.snapshot().await.unwrap();

        source.fail_list("ranking unavailable");
        tokio::time::advance(DURATION - SKEW).await;
        wait_until(|| cache.stats().failed_refreshes == 1).await;
        let kept = cache.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&kept, &original));

        source.restore_list();
        tokio::time::advance(DURATION - SKEW).await;
        wait_until(|| cache.stats().installs == 2).await;
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_refreshing() {
        let (source, cache) = setup();
        let handle = cache.start_refresher();
        wait_until(|| cache.stats().installs == 1).await;

        handle.shutdown().await;
        tokio::time::advance(DURATION * 3).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(source.list_calls(), 1);
    }
}
