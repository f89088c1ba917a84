//! What a front end shows: the story list and how long it took to get.

use crate::{cache::ItemCache, error::Result, item::Item};
use serde::Serialize;
use std::{fmt::Write, sync::Arc, time::Duration};
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct StoriesPage {
    pub stories: Arc<[Item]>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl StoriesPage {
    /// Reads the stories from `cache`, timing the call.
    pub async fn load(cache: &ItemCache) -> Result<Self> {
        let start = Instant::now();
        let stories = cache.items().await?;
        Ok(Self {
            stories,
            elapsed: start.elapsed(),
        })
    }

    /// One numbered line per story, then the time taken.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (rank, story) in self.stories.iter().enumerate() {
            let _ = write!(out, "{:>3}. {}", rank + 1, story.title);
            if !story.host.is_empty() {
                let _ = write!(out, " ({})", story.host);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "fetched in {}ms", self.elapsed.as_millis());
        out
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
