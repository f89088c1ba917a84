// src/main.rs
use anyhow::Context;
use clap::Parser;
use log::{error, info};
use quiet_hn::{config::load_config, utils::setup_logging, HnClient, StoriesPage};
use std::{sync::Arc, time::Duration};

#[derive(Debug, Parser)]
#[command(name = "quiet_hn", version, about = "Top Hacker News stories, cached")]
struct Args {
    /// Number of stories to show (overrides NUM_STORIES)
    #[arg(long)]
    num_stories: Option<usize>,

    /// How long a fetched list stays valid (overrides CACHE_DURATION_SECS)
    #[arg(long)]
    cache_duration_secs: Option<u64>,

    /// How much earlier than expiry to refresh (overrides REFRESH_SKEW_SECS)
    #[arg(long)]
    refresh_skew_secs: Option<u64>,

    /// Keep running and reprint the list every refresh interval
    #[arg(long)]
    watch: bool,

    /// Print the page as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn print_page(page: &StoriesPage, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
    } else {
        print!("{}", page.render_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config();
    if let Some(n) = args.num_stories {
        config.num_stories = n;
    }
    if let Some(secs) = args.cache_duration_secs {
        config.cache_duration = Duration::from_secs(secs);
    }
    if let Some(secs) = args.refresh_skew_secs {
        config.refresh_skew = Duration::from_secs(secs);
    }

    setup_logging(config.log_level).context("Failed to initialize logging")?;
    config.validate_and_log()?;

    if !args.watch {
        // One-shot: no refresher, a single foreground fetch.
        let client = HnClient::new(&config.api_base_url, config.fetch_timeout)?;
        let cache = quiet_hn::build_cache(Arc::new(client), &config);
        let page = StoriesPage::load(&cache).await?;
        return print_page(&page, args.json);
    }

    let (cache, refresher) = quiet_hn::launch(&config)?;
    let mut ticker = tokio::time::interval(config.refresh_interval());
    info!("Watching top stories. Press CTRL-C to exit.");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match StoriesPage::load(&cache).await {
                    Ok(page) => print_page(&page, args.json)?,
                    Err(e) => error!("Failed to load stories: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down gracefully...");
    refresher.shutdown().await;
    let stats = cache.stats();
    info!(
        "Cache stats: {} hits, {} misses, {} installs, {} failed refreshes",
        stats.hits, stats.misses, stats.installs, stats.failed_refreshes
    );
    Ok(())
}
