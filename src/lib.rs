//! reelcore - Feed pagination and playback cache for a short-form video feed
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (catalog entries, hashtags, player state machine, window)
//! - ports/: Trait definitions (catalog, blob store, decoder, engagement)
//! - adapters/: Concrete implementations
//! - application/: Generic services (resolver, playback cache, player, feed)
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Local directory blob store, in-memory catalog, headless decoder
//! - `http`: Blob store over HTTP

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::blob_resolver::BlobResolver;
pub use application::engagement::EngagementOverlay;
pub use application::feed::{FeedController, FeedMode, LoadOutcome, VisibleItem};
pub use application::playback_cache::PlaybackCache;
pub use application::player::{PlayerContext, PlayerHandle, PlayerNotice, PlayerSnapshot};
pub use config::CoreConfig;

#[cfg(feature = "local")]
pub use adapters::local::{FsBlobStore, HeadlessDecoder, MemoryCatalog, MemoryEngagement};

#[cfg(feature = "http")]
pub use adapters::http::HttpBlobStore;
