use crate::error::{Result, StoryError};
use crate::hn::client::DEFAULT_API_BASE;
use crate::cache::{CacheConfig, MAX_CACHE_DURATION};
use crate::pipeline::PipelineConfig;
use log::LevelFilter;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of stories to keep cached and show
    pub num_stories: usize,
    pub cache_duration: Duration,
    /// How much earlier than expiry the background refresh fires
    pub refresh_skew: Duration,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub api_base_url: String,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_stories: 30,
            cache_duration: Duration::from_secs(300),
            refresh_skew: Duration::from_secs(5),
            fetch_timeout: Duration::from_millis(5000),
            max_concurrent_fetches: 32,
            api_base_url: DEFAULT_API_BASE.to_string(),
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or unparsable keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Config {
            num_stories: parsed("NUM_STORIES")
                .map(|v| v as usize)
                .unwrap_or(defaults.num_stories),
            cache_duration: parsed("CACHE_DURATION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_duration),
            refresh_skew: parsed("REFRESH_SKEW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_skew),
            fetch_timeout: parsed("FETCH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            max_concurrent_fetches: parsed("MAX_CONCURRENT_FETCHES")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_concurrent_fetches),
            api_base_url: lookup("HN_API_BASE_URL").unwrap_or(defaults.api_base_url),
            log_level: lookup("LOG_LEVEL")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.log_level),
        }
    }

    /// Interval between background refreshes.
    pub fn refresh_interval(&self) -> Duration {
        self.cache_duration.saturating_sub(self.refresh_skew)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            fetch_timeout: self.fetch_timeout,
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            num_stories: self.num_stories,
            duration: self.cache_duration,
            refresh_skew: self.refresh_skew,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_duration.is_zero() {
            return Err(StoryError::Config("CACHE_DURATION_SECS must be positive".to_string()));
        }
        if self.cache_duration > MAX_CACHE_DURATION {
            return Err(StoryError::Config(format!(
                "CACHE_DURATION_SECS must be at most {}s",
                MAX_CACHE_DURATION.as_secs()
            )));
        }
        if self.refresh_skew >= self.cache_duration {
            return Err(StoryError::Config(format!(
                "REFRESH_SKEW_SECS ({}s) must be shorter than CACHE_DURATION_SECS ({}s)",
                self.refresh_skew.as_secs(),
                self.cache_duration.as_secs()
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(StoryError::Config("FETCH_TIMEOUT_MS must be positive".to_string()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(StoryError::Config(
                "MAX_CONCURRENT_FETCHES must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.api_base_url).map_err(|e| {
            StoryError::Config(format!("HN_API_BASE_URL '{}' is invalid: {}", self.api_base_url, e))
        })?;
        Ok(())
    }

    pub fn validate_and_log(&self) -> Result<()> {
        self.validate()?;
        log::info!("Application Configuration Loaded: {:?}", self);
        log::info!(
            "Caching {} stories for {}s, refreshing every {}s",
            self.num_stories,
            self.cache_duration.as_secs(),
            self.refresh_interval().as_secs()
        );
        Ok(())
    }
}
