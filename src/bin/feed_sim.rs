//! Feed simulator - scrolls through a catalog manifest with headless players
//!
//! Usage: `feed_sim <manifest.json> [blob_root] [#hashtag | @user]`
//!
//! It wires up:
//! - Local adapters (directory blob store, in-memory catalog, headless decoder)
//! - The blob resolver, playback cache and feed controller
//! - One player per visible item, with a double tap on every third video

use reelcore::application::player::{self, PlayerNotice};
use reelcore::domain::catalog::UserId;
use reelcore::domain::playback::PlayerState;
use reelcore::{
    BlobResolver, CoreConfig, EngagementOverlay, FeedController, FeedMode, FsBlobStore,
    HeadlessDecoder, MemoryCatalog, MemoryEngagement, PlaybackCache, PlayerContext,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const VIEWER: &str = "feed-sim";

fn feed_mode(arg: Option<&str>) -> FeedMode {
    match arg {
        Some(tag) if tag.starts_with('#') => FeedMode::Hashtag(tag.to_string()),
        Some(user) if user.starts_with('@') => {
            FeedMode::Personalized(UserId(user.trim_start_matches('@').to_string()))
        }
        _ => FeedMode::Chronological,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(manifest) = args.first().map(PathBuf::from) else {
        eprintln!("Usage: feed_sim <manifest.json> [blob_root] [#hashtag | @user]");
        std::process::exit(2);
    };
    let blob_root = args.get(1).map(PathBuf::from).unwrap_or_else(|| {
        manifest
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let mode = feed_mode(args.get(2).map(String::as_str));
    let steps: usize = env::var("REEL_SIM_STEPS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let dwell = Duration::from_millis(
        env::var("REEL_SIM_DWELL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1500),
    );

    // 1. Adapters (Local implementations)
    let catalog = match MemoryCatalog::from_json_file(&manifest).await {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("Failed to load manifest {:?}: {}", manifest, e);
            std::process::exit(1);
        }
    };
    let decoder = Arc::new(HeadlessDecoder::new());
    let engagement = Arc::new(MemoryEngagement::new());

    // 2. Application Services
    let resolver = BlobResolver::new(Arc::new(FsBlobStore::new(blob_root)), config.resolver.clone());
    match resolver.cleanup().await {
        Ok(report) if report.removed > 0 => info!(removed = report.removed, "cleaned video cache"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "video cache cleanup failed"),
    }
    let cache = Arc::new(PlaybackCache::new(config.cache));
    let _sweeper = cache.spawn_sweeper();
    let overlay = Arc::new(EngagementOverlay::new(engagement, UserId(VIEWER.to_string())));
    let ctx = PlayerContext {
        decoder: decoder.clone(),
        resolver,
        cache: cache.clone(),
        config: config.player,
    };

    let feed = FeedController::new(catalog, config.feed, mode.clone());
    match feed.refresh().await {
        Ok(outcome) => info!(mode = ?mode, outcome = ?outcome, "feed loaded"),
        Err(e) => {
            error!(error = %e, "initial feed load failed");
            std::process::exit(1);
        }
    }

    // 3. Scroll
    let mut index = 0;
    let mut last_shown: Option<String> = None;
    for step in 0..steps {
        feed.on_scroll_begin();
        feed.on_viewport_change(index, 1.0);
        feed.on_scroll_end();
        tokio::time::sleep(config.feed.scroll_settle + Duration::from_millis(50)).await;

        let window = feed.window();
        let Some(visible) = feed.visible_index().and_then(|i| window.get(i).cloned()) else {
            info!(step, "nothing left to show");
            break;
        };
        if last_shown.as_deref() == Some(visible.id.as_str()) {
            info!(step, has_more = feed.has_more(), "reached the end of the feed");
            break;
        }
        last_shown = Some(visible.id.clone());

        let handle = player::mount(ctx.clone(), visible.clone());
        let mut notices = handle.notices();
        handle.set_visible(true);
        if step % 3 == 2 {
            tokio::time::sleep(config.player.visibility_debounce).await;
            handle.tap();
            handle.tap();
        }
        tokio::time::sleep(dwell).await;

        while let Ok(notice) = notices.try_recv() {
            match notice {
                PlayerNotice::LikeRequested { video_id } => match overlay.like(&visible).await {
                    Ok(state) => info!(video_id = %video_id, likes = state.like_count, "liked"),
                    Err(e) => warn!(error = %e, "like failed"),
                },
                PlayerNotice::LoadFailed(e) => warn!(error = %e, "player gave up"),
            }
        }

        let snapshot = handle.snapshot();
        info!(
            step,
            video_id = %snapshot.video_id,
            state = ?snapshot.state,
            playing = snapshot.state == PlayerState::Playing,
            cached = cache.len(),
            window = window.len(),
            "viewed video"
        );
        handle.unmount();

        index = feed.visible_index().map_or(0, |i| i + 1);
    }

    info!(
        sessions = decoder.session_count(),
        cached = cache.len(),
        "simulation finished"
    );
}
