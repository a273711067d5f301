//! Bounded cache of per-video playback intent.
//!
//! Players write their play/pause intent here so a remounted player can pick
//! up where it left off. Only lightweight intent is stored, never decode
//! buffers. Eviction is strictly least-recently-updated.

use crate::config::PlaybackCacheConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackIntent {
    Play,
    Pause { by_user: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackCacheEntry {
    /// Local file, once resolved
    pub uri: Option<PathBuf>,
    pub intent: PlaybackIntent,
    pub updated_at: Instant,
    /// Orders updates that share a timestamp
    revision: u64,
}

impl PlaybackCacheEntry {
    pub fn is_user_paused(&self) -> bool {
        self.intent == PlaybackIntent::Pause { by_user: true }
    }
}

/// Fields to change; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackUpdate {
    pub uri: Option<PathBuf>,
    pub intent: Option<PlaybackIntent>,
}

impl PlaybackUpdate {
    pub fn intent(intent: PlaybackIntent) -> Self {
        Self {
            uri: None,
            intent: Some(intent),
        }
    }

    pub fn uri(uri: PathBuf) -> Self {
        Self {
            uri: Some(uri),
            intent: None,
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, PlaybackCacheEntry>,
    revision: u64,
}

pub struct PlaybackCache {
    config: PlaybackCacheConfig,
    state: Mutex<CacheState>,
}

impl PlaybackCache {
    pub fn new(config: PlaybackCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn get(&self, video_id: &str) -> Option<PlaybackCacheEntry> {
        self.state.lock().entries.get(video_id).cloned()
    }

    /// Apply a partial update. Creates the entry on first use.
    pub fn update(&self, video_id: &str, update: PlaybackUpdate) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.revision += 1;
        let revision = state.revision;
        let now = Instant::now();

        let grew = !state.entries.contains_key(video_id);
        let entry = state
            .entries
            .entry(video_id.to_string())
            .or_insert_with(|| PlaybackCacheEntry {
                uri: None,
                intent: PlaybackIntent::Pause { by_user: false },
                updated_at: now,
                revision,
            });
        if let Some(uri) = update.uri {
            entry.uri = Some(uri);
        }
        if let Some(intent) = update.intent {
            entry.intent = intent;
        }
        entry.updated_at = now;
        entry.revision = revision;

        if grew && state.entries.len() > self.config.max_size {
            Self::evict(state, self.config.max_size);
        }
    }

    /// Keep only the `max_size` most recently updated entries.
    pub fn evict_oldest(&self) -> usize {
        let mut state = self.state.lock();
        Self::evict(&mut state, self.config.max_size)
    }

    fn evict(state: &mut CacheState, max_size: usize) -> usize {
        if state.entries.len() <= max_size {
            return 0;
        }
        let mut by_recency: Vec<(String, u64)> = state
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.revision))
            .collect();
        by_recency.sort_by(|a, b| b.1.cmp(&a.1));

        let evicted: Vec<String> = by_recency
            .into_iter()
            .skip(max_size)
            .map(|(id, _)| id)
            .collect();
        for id in &evicted {
            state.entries.remove(id);
        }
        debug!(evicted = ?evicted, "evicted playback cache entries");
        evicted.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub fn has_active_playback(&self) -> bool {
        self.state
            .lock()
            .entries
            .values()
            .any(|e| e.intent == PlaybackIntent::Play)
    }

    /// Periodically evict while anything is playing.
    ///
    /// The task holds a weak reference and ends once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if cache.has_active_playback() {
                    cache.evict_oldest();
                }
            }
        })
    }
}

impl Default for PlaybackCache {
    fn default() -> Self {
        Self::new(PlaybackCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache(max_size: usize) -> PlaybackCache {
        PlaybackCache::new(PlaybackCacheConfig {
            max_size,
            sweep_interval: Duration::from_millis(100),
        })
    }

    #[tokio::test]
    async fn test_retains_most_recently_updated() {
        let cache = cache(5);
        for i in 0..8 {
            cache.update(&format!("v{}", i), PlaybackUpdate::intent(PlaybackIntent::Play));
            assert!(cache.len() <= 5);
        }
        let mut ids = cache.ids();
        ids.sort();
        assert_eq!(ids, vec!["v3", "v4", "v5", "v6", "v7"]);
    }

    #[tokio::test]
    async fn test_touching_an_entry_protects_it() {
        let cache = cache(3);
        for id in ["a", "b", "c"] {
            cache.update(id, PlaybackUpdate::default());
        }
        cache.update("a", PlaybackUpdate::intent(PlaybackIntent::Pause { by_user: true }));
        cache.update("d", PlaybackUpdate::default());

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").unwrap().is_user_paused());
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let cache = cache(5);
        cache.update("v1", PlaybackUpdate::uri(PathBuf::from("/tmp/v1.mp4")));
        cache.update("v1", PlaybackUpdate::intent(PlaybackIntent::Play));

        let entry = cache.get("v1").unwrap();
        assert_eq!(entry.uri, Some(PathBuf::from("/tmp/v1.mp4")));
        assert_eq!(entry.intent, PlaybackIntent::Play);
    }

    #[tokio::test]
    async fn test_new_entry_defaults_to_automatic_pause() {
        let cache = cache(5);
        cache.update("v1", PlaybackUpdate::default());
        let entry = cache.get("v1").unwrap();
        assert_eq!(entry.intent, PlaybackIntent::Pause { by_user: false });
        assert!(!cache.has_active_playback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_cache_dropped() {
        let cache = Arc::new(cache(2));
        let sweeper = cache.spawn_sweeper();
        cache.update("v1", PlaybackUpdate::intent(PlaybackIntent::Play));
        drop(cache);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(sweeper.is_finished());
    }
}
