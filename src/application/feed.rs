//! Feed pagination controller.
//!
//! Pages the catalog into a bounded, duplicate-free window and tracks which
//! item the viewport shows. Fetches are serialized by an `is_fetching` flag;
//! a reset bumps the generation so results of older fetches are dropped.

use crate::application::timer::Timer;
use crate::config::FeedConfig;
use crate::domain::catalog::{CatalogEntry, CatalogFilter, Cursor, Page, UserId};
use crate::domain::errors::QueryError;
use crate::domain::hashtags;
use crate::domain::window::{FeedWindow, SeenIdSet};
use crate::ports::catalog::CatalogQueryPort;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Candidates fetched per personalized page, as a multiple of the page size
const PERSONALIZED_CANDIDATE_FACTOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMode {
    /// Completed entries, newest first
    Chronological,
    /// Entries carrying a hashtag
    Hashtag(String),
    /// Entries ranked by the hashtags a user follows
    Personalized(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    InitialLoad,
    InFlight,
    SmallHashtagFeed,
    Exhausted,
}

/// What a call to [`FeedController::load_more`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Appended {
        added: usize,
        /// Entries dropped from the window head
        dropped: usize,
        /// Times the window was cleared because a batch held nothing new
        recovered: u32,
    },
    Suppressed(SuppressReason),
    /// The catalog has nothing after the current cursor
    EndOfContent,
    /// Recoveries kept returning only seen entries
    Exhausted,
    /// The feed was reset while the fetch was in flight
    Stale,
}

/// The item the viewport currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleItem {
    pub index: usize,
    pub video_id: String,
}

/// Personalized candidates fetched but not shown yet.
#[derive(Debug, Clone, Default)]
struct Backlog {
    entries: Vec<CatalogEntry>,
    /// The catalog had nothing after the last candidate query
    drained: bool,
}

struct Fetched {
    page: Page,
    backlog: Backlog,
}

struct FeedState {
    mode: FeedMode,
    window: FeedWindow,
    seen: SeenIdSet,
    cursor: Option<Cursor>,
    backlog: Backlog,
    has_more: bool,
    loaded: bool,
    is_fetching: bool,
    exhausted: bool,
    /// Recoveries since a continuation page last added entries
    recoveries: u32,
    generation: u64,
    visible_index: Option<usize>,
    scrolling: bool,
    /// Candidate reported during a scroll, applied once it settles
    pending_visible: Option<usize>,
}

#[derive(Default)]
struct FeedTimers {
    visibility: Timer,
    scroll_settle: Timer,
    load_more: Timer,
}

enum Settled {
    Done(Result<LoadOutcome, QueryError>),
    Retry { recovered: u32 },
}

/// Clears `is_fetching` when a fetch is dropped before it settles.
struct FetchGuard<'a, C> {
    feed: &'a FeedController<C>,
    generation: u64,
    settled: bool,
}

impl<C> Drop for FetchGuard<'_, C> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.feed.state.lock();
        if state.generation == self.generation {
            debug!(generation = self.generation, "fetch dropped before settling");
            state.is_fetching = false;
        }
    }
}

pub struct FeedController<C> {
    catalog: Arc<C>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    timers: Mutex<FeedTimers>,
    visible: watch::Sender<Option<VisibleItem>>,
    me: Weak<Self>,
}

impl<C> FeedController<C>
where
    C: CatalogQueryPort + 'static,
{
    pub fn new(catalog: Arc<C>, config: FeedConfig, mode: FeedMode) -> Arc<Self> {
        let (visible, _) = watch::channel(None);
        Arc::new_cyclic(|me| Self {
            catalog,
            config,
            state: Mutex::new(FeedState {
                mode,
                window: FeedWindow::new(config.max_in_memory),
                seen: SeenIdSet::new(config.max_cached_ids),
                cursor: None,
                backlog: Backlog::default(),
                has_more: true,
                loaded: false,
                is_fetching: false,
                exhausted: false,
                recoveries: 0,
                generation: 0,
                visible_index: None,
                scrolling: false,
                pending_visible: None,
            }),
            timers: Mutex::new(FeedTimers::default()),
            visible,
            me: me.clone(),
        })
    }

    pub fn mode(&self) -> FeedMode {
        self.state.lock().mode.clone()
    }

    pub fn window(&self) -> Vec<CatalogEntry> {
        self.state.lock().window.to_vec()
    }

    pub fn window_ids(&self) -> Vec<String> {
        self.state.lock().window.ids()
    }

    pub fn seen_len(&self) -> usize {
        self.state.lock().seen.len()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.lock().exhausted
    }

    pub fn visible_index(&self) -> Option<usize> {
        self.state.lock().visible_index
    }

    pub fn subscribe_visible(&self) -> watch::Receiver<Option<VisibleItem>> {
        self.visible.subscribe()
    }

    /// Fetch one page in the current mode. Only completed entries are kept.
    pub async fn fetch_page(&self, cursor: Option<Cursor>) -> Result<Page, QueryError> {
        let mode = self.mode();
        let fetched = self
            .fetch_page_in(&mode, cursor, Backlog::default())
            .await?;
        Ok(fetched.page)
    }

    async fn fetch_page_in(
        &self,
        mode: &FeedMode,
        cursor: Option<Cursor>,
        backlog: Backlog,
    ) -> Result<Fetched, QueryError> {
        let page_size = self.config.page_size;
        let query_error = |cursor: &Option<Cursor>, source| QueryError {
            cursor: cursor
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "<start>".to_string()),
            source,
        };

        let (mut page, backlog) = match mode {
            FeedMode::Chronological => {
                let page = self
                    .catalog
                    .query_entries(&CatalogFilter::None, cursor.clone(), page_size)
                    .await
                    .map_err(|e| query_error(&cursor, e))?;
                (page, Backlog::default())
            }
            FeedMode::Hashtag(tag) => {
                let filter = CatalogFilter::Hashtags(hashtags::variants(tag));
                let page = self
                    .catalog
                    .query_entries(&filter, cursor.clone(), page_size)
                    .await
                    .map_err(|e| query_error(&cursor, e))?;
                (page, Backlog::default())
            }
            FeedMode::Personalized(user) => {
                let followed = match self.catalog.followed_hashtags(user).await {
                    Ok(tags) => tags,
                    Err(e) => {
                        warn!(user = %user, error = %e, "followed hashtags unavailable, sampling");
                        Vec::new()
                    }
                };
                // Unpicked candidates carry over, so topping the pool up
                // never skips part of the catalog.
                let pool_size = page_size * PERSONALIZED_CANDIDATE_FACTOR;
                let Backlog {
                    entries: mut pool,
                    mut drained,
                } = backlog;
                let mut next_cursor = cursor.clone();
                if pool.len() < pool_size && !drained {
                    let filter = CatalogFilter::Requester(user.clone());
                    let candidates = self
                        .catalog
                        .query_entries(&filter, cursor.clone(), pool_size - pool.len())
                        .await
                        .map_err(|e| query_error(&cursor, e))?;
                    drained = !(candidates.has_more && candidates.next_cursor.is_some());
                    if candidates.next_cursor.is_some() {
                        next_cursor = candidates.next_cursor;
                    }
                    pool.extend(
                        candidates
                            .entries
                            .into_iter()
                            .filter(CatalogEntry::is_displayable),
                    );
                }

                let picked = {
                    let mut rng = rand::thread_rng();
                    if followed.is_empty() {
                        hashtags::sample(pool.clone(), page_size, &mut rng)
                    } else {
                        hashtags::rank_by_overlap(pool.clone(), &followed, page_size, &mut rng)
                    }
                };
                let picked_ids: HashSet<String> = picked.iter().map(|e| e.id.clone()).collect();
                pool.retain(|e| !picked_ids.contains(&e.id));

                let page = Page {
                    entries: picked,
                    next_cursor,
                    has_more: !drained || !pool.is_empty(),
                };
                let backlog = Backlog {
                    entries: pool,
                    drained,
                };
                (page, backlog)
            }
        };

        page.entries.retain(CatalogEntry::is_displayable);
        Ok(Fetched { page, backlog })
    }

    /// Drop everything and load the first page again.
    pub async fn refresh(&self) -> Result<LoadOutcome, QueryError> {
        let (generation, mode) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.window.clear();
            state.seen.clear();
            state.cursor = None;
            state.backlog = Backlog::default();
            state.has_more = true;
            state.loaded = false;
            state.exhausted = false;
            state.recoveries = 0;
            state.is_fetching = true;
            state.visible_index = None;
            state.pending_visible = None;
            (state.generation, state.mode.clone())
        };
        self.cancel_timers();
        self.visible.send_replace(None);
        info!(mode = ?mode, "refreshing feed");
        self.run_fetch(generation, mode, None, Backlog::default())
            .await
    }

    pub async fn set_mode(&self, mode: FeedMode) -> Result<LoadOutcome, QueryError> {
        self.state.lock().mode = mode;
        self.refresh().await
    }

    /// Append the next page to the window.
    pub async fn load_more(&self) -> Result<LoadOutcome, QueryError> {
        let (generation, mode, cursor, backlog) = {
            let mut state = self.state.lock();
            if state.is_fetching {
                let reason = if state.loaded {
                    SuppressReason::InFlight
                } else {
                    SuppressReason::InitialLoad
                };
                return Ok(LoadOutcome::Suppressed(reason));
            }
            if state.loaded {
                if state.exhausted {
                    return Ok(LoadOutcome::Suppressed(SuppressReason::Exhausted));
                }
                if matches!(state.mode, FeedMode::Hashtag(_))
                    && state.window.len() < self.config.min_hashtag_window
                {
                    return Ok(LoadOutcome::Suppressed(SuppressReason::SmallHashtagFeed));
                }
                if !state.has_more {
                    return Ok(LoadOutcome::EndOfContent);
                }
            }
            state.is_fetching = true;
            (
                state.generation,
                state.mode.clone(),
                state.cursor.clone(),
                state.backlog.clone(),
            )
        };
        self.run_fetch(generation, mode, cursor, backlog).await
    }

    async fn run_fetch(
        &self,
        generation: u64,
        mode: FeedMode,
        cursor: Option<Cursor>,
        backlog: Backlog,
    ) -> Result<LoadOutcome, QueryError> {
        let mut guard = FetchGuard {
            feed: self,
            generation,
            settled: false,
        };
        let mut cursor = cursor;
        let mut backlog = backlog;
        let mut recovered = 0;
        loop {
            let continuation = cursor.is_some();
            let result = self.fetch_page_in(&mode, cursor.clone(), backlog).await;
            match self.settle_page(generation, result, recovered, continuation) {
                Settled::Done(outcome) => {
                    guard.settled = true;
                    return outcome;
                }
                Settled::Retry { recovered: count } => {
                    recovered = count;
                    cursor = None;
                    backlog = Backlog::default();
                    tokio::time::sleep(self.config.empty_batch_backoff).await;
                }
            }
        }
    }

    fn settle_page(
        &self,
        generation: u64,
        result: Result<Fetched, QueryError>,
        recovered: u32,
        continuation: bool,
    ) -> Settled {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation, current = state.generation, "discarding stale page");
            return Settled::Done(Ok(LoadOutcome::Stale));
        }

        let Fetched { page, backlog } = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(cursor = %e.cursor, error = %e.source, "feed fetch failed");
                state.is_fetching = false;
                return Settled::Done(Err(e));
            }
        };

        let fetched = page.entries.len();
        let fresh: Vec<CatalogEntry> = page
            .entries
            .into_iter()
            .filter(|e| !state.seen.contains(&e.id))
            .collect();

        if fresh.is_empty() && (fetched > 0 || page.has_more) {
            state.recoveries += 1;
            let attempt = state.recoveries;
            info!(
                fetched,
                attempt,
                mode = ?state.mode,
                "batch held no new entries, clearing feed"
            );
            state.window.clear();
            state.seen.clear();
            state.cursor = None;
            state.backlog = Backlog::default();
            state.visible_index = None;
            state.pending_visible = None;
            self.visible.send_replace(None);

            if attempt > self.config.max_empty_batch_retries {
                warn!(attempts = attempt - 1, "feed exhausted");
                state.exhausted = true;
                state.has_more = false;
                state.loaded = true;
                state.is_fetching = false;
                return Settled::Done(Ok(LoadOutcome::Exhausted));
            }
            return Settled::Retry {
                recovered: recovered + 1,
            };
        }

        for entry in &fresh {
            state.seen.insert(&entry.id);
        }
        let (added, dropped) = state.window.extend(fresh);
        if dropped > 0 {
            self.shift_visible(&mut state, dropped);
        }

        if added > 0 && continuation {
            state.recoveries = 0;
        }
        state.has_more =
            page.has_more && (page.next_cursor.is_some() || !backlog.entries.is_empty());
        if page.next_cursor.is_some() {
            state.cursor = page.next_cursor;
        }
        state.backlog = backlog;
        state.loaded = true;
        state.is_fetching = false;

        debug!(
            added,
            dropped,
            window = state.window.len(),
            seen = state.seen.len(),
            has_more = state.has_more,
            "page appended"
        );
        if added == 0 {
            return Settled::Done(Ok(LoadOutcome::EndOfContent));
        }
        Settled::Done(Ok(LoadOutcome::Appended {
            added,
            dropped,
            recovered,
        }))
    }

    fn shift_visible(&self, state: &mut FeedState, dropped: usize) {
        let Some(index) = state.visible_index else {
            return;
        };
        let index = index.saturating_sub(dropped);
        state.visible_index = Some(index);
        let item = state.window.get(index).map(|e| VisibleItem {
            index,
            video_id: e.id.clone(),
        });
        self.visible.send_replace(item);
    }

    /// Viewport report: item `index` is `fraction` visible.
    pub fn on_viewport_change(&self, index: usize, fraction: f32) {
        if fraction < self.config.min_visible_fraction {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.scrolling {
                state.pending_visible = Some(index);
                return;
            }
        }
        let me = self.me.clone();
        self.timers
            .lock()
            .visibility
            .start(self.config.visibility_stable, async move {
                if let Some(feed) = me.upgrade() {
                    feed.commit_visible(index);
                }
            });
    }

    pub fn on_scroll_begin(&self) {
        self.state.lock().scrolling = true;
        let mut timers = self.timers.lock();
        timers.visibility.cancel();
        timers.scroll_settle.cancel();
    }

    pub fn on_scroll_end(&self) {
        let me = self.me.clone();
        self.timers
            .lock()
            .scroll_settle
            .start(self.config.scroll_settle, async move {
                if let Some(feed) = me.upgrade() {
                    feed.scroll_settled();
                }
            });
    }

    fn scroll_settled(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.scrolling = false;
            state.pending_visible.take()
        };
        if let Some(index) = pending {
            self.commit_visible(index);
        }
    }

    fn commit_visible(&self, index: usize) {
        let near_end = {
            let mut state = self.state.lock();
            let Some(entry) = state.window.get(index) else {
                return;
            };
            let item = VisibleItem {
                index,
                video_id: entry.id.clone(),
            };
            state.visible_index = Some(index);
            debug!(index, video_id = %item.video_id, "visible item changed");
            self.visible.send_replace(Some(item));
            // Within `load_more_threshold` items of the last one.
            index + self.config.load_more_threshold + 1 >= state.window.len()
        };
        if near_end {
            self.schedule_load_more();
        }
    }

    fn schedule_load_more(&self) {
        let me = self.me.clone();
        self.timers
            .lock()
            .load_more
            .debounce(self.config.load_more_debounce, async move {
                let Some(feed) = me.upgrade() else {
                    return;
                };
                match feed.load_more().await {
                    Ok(outcome) => debug!(outcome = ?outcome, "load more finished"),
                    Err(e) => warn!(error = %e, "load more failed"),
                }
            });
    }

    fn cancel_timers(&self) {
        let mut timers = self.timers.lock();
        timers.visibility.cancel();
        timers.scroll_settle.cancel();
        timers.load_more.cancel();
    }
}
