//! Configuration of the feed core, loaded from the environment.
//!
//! Every value has a default; `REEL_*` variables override them.

use crate::domain::playback::PlaybackPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}

/// Blob resolver settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Directory holding downloaded videos
    pub cache_dir: PathBuf,
    /// Files below this size are treated as corrupt by the cleanup sweep
    pub min_valid_file_size: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: env::temp_dir().join("reelcore").join("videos"),
            min_valid_file_size: 10_000,
        }
    }
}

/// Playback cache (resource pool) settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackCacheConfig {
    pub max_size: usize,
    /// Eviction sweep period while something is playing
    pub sweep_interval: Duration,
}

impl Default for PlaybackCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            sweep_interval: Duration::from_millis(5000),
        }
    }
}

/// Per-player timing settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    pub policy: PlaybackPolicy,
    pub visibility_debounce: Duration,
    pub double_tap_window: Duration,
    pub like_animation: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            policy: PlaybackPolicy::default(),
            visibility_debounce: Duration::from_millis(500),
            double_tap_window: Duration::from_millis(300),
            like_animation: Duration::from_millis(1000),
        }
    }
}

/// Feed pagination settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedConfig {
    pub page_size: usize,
    pub max_in_memory: usize,
    pub max_cached_ids: usize,
    /// Hashtag feeds do not load more below this many entries
    pub min_hashtag_window: usize,
    /// Load more once the visible index is this close to the end
    pub load_more_threshold: usize,
    pub load_more_debounce: Duration,
    pub visibility_stable: Duration,
    pub scroll_settle: Duration,
    /// Visible fraction at which an item counts as visible
    pub min_visible_fraction: f32,
    pub max_empty_batch_retries: u32,
    pub empty_batch_backoff: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 5,
            max_in_memory: 10,
            max_cached_ids: 50,
            min_hashtag_window: 4,
            load_more_threshold: 2,
            load_more_debounce: Duration::from_millis(300),
            visibility_stable: Duration::from_millis(100),
            scroll_settle: Duration::from_millis(150),
            min_visible_fraction: 0.5,
            max_empty_batch_retries: 3,
            empty_batch_backoff: Duration::from_millis(250),
        }
    }
}

/// Configuration of every component, as one value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoreConfig {
    pub resolver: ResolverConfig,
    pub cache: PlaybackCacheConfig,
    pub player: PlayerConfig,
    pub feed: FeedConfig,
}

impl CoreConfig {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(dir) = env::var("REEL_CACHE_DIR") {
            config.resolver.cache_dir = PathBuf::from(dir);
        }
        config.resolver.min_valid_file_size =
            parse_var("REEL_MIN_VALID_FILE_SIZE", config.resolver.min_valid_file_size)?;

        config.cache.max_size = parse_var("REEL_MAX_CACHE_SIZE", config.cache.max_size)?;
        config.cache.sweep_interval = millis_var("REEL_CACHE_SWEEP_MS", config.cache.sweep_interval)?;

        let policy = &mut config.player.policy;
        policy.max_retries = parse_var("REEL_MAX_RETRIES", policy.max_retries)?;
        policy.retry_backoff = millis_var("REEL_RETRY_BACKOFF_MS", policy.retry_backoff)?;
        config.player.visibility_debounce =
            millis_var("REEL_VISIBILITY_DEBOUNCE_MS", config.player.visibility_debounce)?;

        config.feed.page_size = parse_var("REEL_PAGE_SIZE", config.feed.page_size)?;
        config.feed.max_in_memory = parse_var("REEL_MAX_IN_MEMORY", config.feed.max_in_memory)?;
        config.feed.max_cached_ids = parse_var("REEL_MAX_CACHED_IDS", config.feed.max_cached_ids)?;

        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn millis_var(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let ms = parse_var(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}
