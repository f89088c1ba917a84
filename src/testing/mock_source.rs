//! Mock item source for pipeline, cache and refresher tests
//!
//! Serves a scripted ranking and item set from memory with:
//! - Randomized per-item latency (so completion order differs from rank order)
//! - Per-item failures and hangs
//! - A switchable ranking failure
//! - Call counters and an in-flight high-water mark

use crate::{
    error::{Result, StoryError},
    hn::{HnItem, ItemSource},
    item::ItemId,
};
use async_trait::async_trait;
use log::debug;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

#[derive(Debug, Default)]
pub struct MockItemSource {
    ranking: Mutex<Vec<ItemId>>,
    items: Mutex<HashMap<ItemId, HnItem>>,
    failing: Mutex<HashMap<ItemId, StoryError>>,
    hanging: Mutex<HashSet<ItemId>>,
    list_failure: Mutex<Option<String>>,
    /// Per-item latency range in milliseconds, inclusive
    latency_range: (u64, u64),
    list_latency: Duration,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fetched: Mutex<Vec<ItemId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockItemSource {
    /// Ranks `items` in the order given.
    pub fn from_items(items: Vec<HnItem>) -> Self {
        let ranking = items.iter().map(|i| i.id).collect();
        let items = items.into_iter().map(|i| (i.id, i)).collect();
        Self {
            ranking: Mutex::new(ranking),
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    /// A qualifying story with a unique URL.
    pub fn story(id: ItemId) -> HnItem {
        HnItem {
            id,
            kind: "story".to_string(),
            title: Some(format!("Story {}", id)),
            url: Some(format!("https://www.site{}.example/post", id)),
            by: Some("tester".to_string()),
            score: Some(id as i64),
            ..Default::default()
        }
    }

    /// A story without a link, like an Ask HN post.
    pub fn text_post(id: ItemId) -> HnItem {
        HnItem {
            url: None,
            title: Some(format!("Ask HN {}", id)),
            ..Self::story(id)
        }
    }

    /// A non-story item with a link.
    pub fn job(id: ItemId) -> HnItem {
        HnItem {
            kind: "job".to_string(),
            title: Some(format!("Job {}", id)),
            ..Self::story(id)
        }
    }

    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_range = (min_ms, max_ms.max(min_ms));
        self
    }

    pub fn with_list_latency(mut self, latency: Duration) -> Self {
        self.list_latency = latency;
        self
    }

    pub fn fail_item(&self, id: ItemId) {
        self.fail_item_with(id, StoryError::item_fetch(id, "mock failure"));
    }

    /// Makes lookups of `id` return `error`.
    pub fn fail_item_with(&self, id: ItemId, error: StoryError) {
        self.failing.lock().unwrap().insert(id, error);
    }

    /// Makes `id` never answer, so only a deadline can end its fetch.
    pub fn hang_item(&self, id: ItemId) {
        self.hanging.lock().unwrap().insert(id);
    }

    pub fn fail_list(&self, reason: &str) {
        *self.list_failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn restore_list(&self) {
        *self.list_failure.lock().unwrap() = None;
    }

    /// Replaces the ranking; items not yet known are added as stories.
    pub fn set_ranking(&self, ranking: Vec<ItemId>) {
        let mut items = self.items.lock().unwrap();
        for id in &ranking {
            items.entry(*id).or_insert_with(|| Self::story(*id));
        }
        *self.ranking.lock().unwrap() = ranking;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// IDs passed to `fetch_item`, in call order.
    pub fn fetched_ids(&self) -> Vec<ItemId> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn random_latency(&self) -> Duration {
        let (min, max) = self.latency_range;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

#[async_trait]
impl ItemSource for MockItemSource {
    async fn list_top_ids(&self) -> Result<Vec<ItemId>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_latency.is_zero() {
            tokio::time::sleep(self.list_latency).await;
        }
        if let Some(reason) = self.list_failure.lock().unwrap().clone() {
            return Err(StoryError::SourceList(reason));
        }
        Ok(self.ranking.lock().unwrap().clone())
    }

    async fn fetch_item(&self, id: ItemId) -> Result<HnItem> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(id);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let hangs = self.hanging.lock().unwrap().contains(&id);
        if hangs {
            debug!("Mock item {} hanging", id);
            std::future::pending::<()>().await;
        }

        let latency = self.random_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failing.lock().unwrap().get(&id).cloned() {
            return Err(error);
        }
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoryError::item_fetch(id, "item not found"))
    }
}
