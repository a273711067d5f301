//! Player lifecycle controller.
//!
//! Each mounted player runs as one task that owns a [`PlayerMachine`], its
//! decoder session and its timers. The UI drives it through a cloneable
//! [`PlayerHandle`]; dropping the last handle unmounts the player. Timers
//! and background loads post messages back into the same channel, and
//! anything that arrives after unmount is discarded.

use crate::application::blob_resolver::BlobResolver;
use crate::application::playback_cache::{PlaybackCache, PlaybackIntent, PlaybackUpdate};
use crate::application::timer::Timer;
use crate::config::PlayerConfig;
use crate::domain::catalog::CatalogEntry;
use crate::domain::errors::{DecoderError, LoadError, ResolveError};
use crate::domain::playback::{PlayerCommand, PlayerInput, PlayerMachine, PlayerState};
use crate::ports::decoder::{
    DecodeBackend, DecoderConfig, DecoderEvent, DecoderHandle, DecoderStatus,
};
use crate::ports::storage::BlobStorePort;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

const NOTICE_CAPACITY: usize = 16;

/// Shared collaborators of every player.
pub struct PlayerContext<D, S> {
    pub decoder: Arc<D>,
    pub resolver: BlobResolver<S>,
    pub cache: Arc<PlaybackCache>,
    pub config: PlayerConfig,
}

impl<D, S> Clone for PlayerContext<D, S> {
    fn clone(&self) -> Self {
        Self {
            decoder: self.decoder.clone(),
            resolver: self.resolver.clone(),
            cache: self.cache.clone(),
            config: self.config,
        }
    }
}

/// Observable state of one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub video_id: String,
    pub state: PlayerState,
    pub user_paused: bool,
    pub visible: bool,
    /// Transient like animation after a double tap
    pub like_animation: bool,
    pub mounted: bool,
}

/// One-shot notifications for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerNotice {
    LikeRequested { video_id: String },
    LoadFailed(LoadError),
}

#[derive(Debug)]
struct LoadFailure {
    reason: String,
    retryable: bool,
}

impl From<ResolveError> for LoadFailure {
    fn from(err: ResolveError) -> Self {
        Self {
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }
}

impl From<DecoderError> for LoadFailure {
    fn from(err: DecoderError) -> Self {
        Self {
            reason: err.to_string(),
            retryable: true,
        }
    }
}

#[derive(Debug)]
enum PlayerMessage {
    SetVisible(bool),
    VisibilitySettled(bool),
    Tap,
    TapElapsed,
    SetEntry(CatalogEntry),
    Loaded {
        generation: u64,
        result: Result<PathBuf, LoadFailure>,
    },
    RetryElapsed,
    ResumeElapsed,
    LikeAnimationEnded,
    Unmount,
}

/// Sends `Unmount` once, when the last handle goes away.
struct MountGuard {
    tx: mpsc::UnboundedSender<PlayerMessage>,
    alive: Arc<AtomicBool>,
}

impl MountGuard {
    fn unmount(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(PlayerMessage::Unmount);
        }
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[derive(Clone)]
pub struct PlayerHandle {
    guard: Arc<MountGuard>,
    snapshot: watch::Receiver<PlayerSnapshot>,
    notices: broadcast::Sender<PlayerNotice>,
}

impl PlayerHandle {
    fn send(&self, msg: PlayerMessage) {
        if self.is_mounted() {
            let _ = self.guard.tx.send(msg);
        }
    }

    /// Viewport visibility; debounced before it reaches the state machine.
    pub fn set_visible(&self, visible: bool) {
        self.send(PlayerMessage::SetVisible(visible));
    }

    /// A tap on the player. Two taps inside the double-tap window are a like.
    pub fn tap(&self) {
        self.send(PlayerMessage::Tap);
    }

    /// Point the player at another (or an updated) entry.
    pub fn set_entry(&self, entry: CatalogEntry) {
        self.send(PlayerMessage::SetEntry(entry));
    }

    pub fn unmount(&self) {
        self.guard.unmount();
    }

    pub fn is_mounted(&self) -> bool {
        self.guard.alive.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<PlayerNotice> {
        self.notices.subscribe()
    }
}

/// Mount a player for `entry` and start its lifecycle.
pub fn mount<D, S>(ctx: PlayerContext<D, S>, entry: CatalogEntry) -> PlayerHandle
where
    D: DecodeBackend + 'static,
    S: BlobStorePort + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let alive = Arc::new(AtomicBool::new(true));
    let (snapshot_tx, snapshot_rx) = watch::channel(PlayerSnapshot {
        video_id: entry.id.clone(),
        state: PlayerState::Idle,
        user_paused: false,
        visible: false,
        like_animation: false,
        mounted: true,
    });
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

    let actor = PlayerActor {
        machine: PlayerMachine::new(ctx.config.policy),
        ctx,
        entry,
        session: None,
        events: None,
        tx: tx.clone(),
        rx,
        snapshot: snapshot_tx,
        notices: notices.clone(),
        generation: 0,
        like_animation: false,
        visibility_timer: Timer::new(),
        tap_timer: Timer::new(),
        retry_timer: Timer::new(),
        resume_timer: Timer::new(),
        like_timer: Timer::new(),
        load_task: None,
        alive: alive.clone(),
    };
    tokio::spawn(actor.run());

    PlayerHandle {
        guard: Arc::new(MountGuard { tx, alive }),
        snapshot: snapshot_rx,
        notices,
    }
}

enum Step {
    Message(Option<PlayerMessage>),
    Event(Option<DecoderEvent>),
}

struct PlayerActor<D, S> {
    ctx: PlayerContext<D, S>,
    entry: CatalogEntry,
    machine: PlayerMachine,
    session: Option<DecoderHandle>,
    events: Option<broadcast::Receiver<DecoderEvent>>,
    tx: mpsc::UnboundedSender<PlayerMessage>,
    rx: mpsc::UnboundedReceiver<PlayerMessage>,
    snapshot: watch::Sender<PlayerSnapshot>,
    notices: broadcast::Sender<PlayerNotice>,
    /// Bumped on every load; results of older loads are dropped
    generation: u64,
    like_animation: bool,
    visibility_timer: Timer,
    tap_timer: Timer,
    retry_timer: Timer,
    resume_timer: Timer,
    like_timer: Timer,
    load_task: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

impl<D, S> PlayerActor<D, S>
where
    D: DecodeBackend + 'static,
    S: BlobStorePort + 'static,
{
    async fn run(mut self) {
        if let Some(cached) = self.ctx.cache.get(&self.entry.id) {
            self.machine.restore_user_paused(cached.is_user_paused());
        }
        self.ensure_session().await;
        self.apply(PlayerInput::Mount).await;

        loop {
            let step = tokio::select! {
                msg = self.rx.recv() => Step::Message(msg),
                event = next_event(&mut self.events) => Step::Event(event),
            };
            match step {
                Step::Message(None) | Step::Message(Some(PlayerMessage::Unmount)) => break,
                Step::Message(Some(msg)) => self.handle(msg).await,
                Step::Event(Some(event)) => self.on_decoder_event(event).await,
                Step::Event(None) => {}
            }
        }

        self.teardown().await;
    }

    async fn handle(&mut self, msg: PlayerMessage) {
        match msg {
            PlayerMessage::SetVisible(visible) => {
                let delay = self.ctx.config.visibility_debounce;
                self.post_after(
                    TimerSlot::Visibility,
                    delay,
                    PlayerMessage::VisibilitySettled(visible),
                );
            }
            PlayerMessage::VisibilitySettled(visible) => {
                if visible != self.machine.visible() {
                    self.apply(PlayerInput::Visibility(visible)).await;
                }
            }
            PlayerMessage::Tap => {
                if self.tap_timer.is_pending() {
                    self.tap_timer.cancel();
                    self.on_double_tap();
                } else {
                    let window = self.ctx.config.double_tap_window;
                    self.post_after(TimerSlot::Tap, window, PlayerMessage::TapElapsed);
                }
            }
            PlayerMessage::TapElapsed => self.apply(PlayerInput::Toggle).await,
            PlayerMessage::SetEntry(entry) => {
                if entry.id == self.entry.id {
                    self.entry = entry;
                    return;
                }
                debug!(from = %self.entry.id, to = %entry.id, "player entry changed");
                self.entry = entry;
                self.retry_timer.cancel();
                self.apply(PlayerInput::EntryChanged).await;
            }
            PlayerMessage::Loaded { generation, result } => {
                if generation != self.generation {
                    debug!(video_id = %self.entry.id, "discarding stale load result");
                    return;
                }
                self.load_task = None;
                match result {
                    Ok(path) => {
                        self.ctx
                            .cache
                            .update(&self.entry.id, PlaybackUpdate::uri(path));
                        self.apply(PlayerInput::SourceReady).await;
                    }
                    Err(failure) => {
                        warn!(
                            video_id = %self.entry.id,
                            reason = %failure.reason,
                            "video load failed"
                        );
                        self.apply(PlayerInput::LoadFailed {
                            reason: failure.reason,
                            retryable: failure.retryable,
                        })
                        .await;
                    }
                }
            }
            PlayerMessage::RetryElapsed => self.apply(PlayerInput::RetryElapsed).await,
            PlayerMessage::ResumeElapsed => self.apply(PlayerInput::ResumeElapsed).await,
            PlayerMessage::LikeAnimationEnded => {
                self.like_animation = false;
                self.publish();
            }
            PlayerMessage::Unmount => {}
        }
    }

    /// Status changes belong to the load task; the session stream only
    /// drives buffering.
    async fn on_decoder_event(&mut self, event: DecoderEvent) {
        match event {
            DecoderEvent::BufferingChange(true) => {
                self.apply(PlayerInput::BufferingStarted).await
            }
            DecoderEvent::BufferingChange(false) => {
                self.apply(PlayerInput::BufferingCleared).await
            }
            other => debug!(video_id = %self.entry.id, event = ?other, "decoder event"),
        }
    }

    fn on_double_tap(&mut self) {
        debug!(video_id = %self.entry.id, "double tap");
        let _ = self.notices.send(PlayerNotice::LikeRequested {
            video_id: self.entry.id.clone(),
        });
        self.like_animation = true;
        let duration = self.ctx.config.like_animation;
        self.post_after(TimerSlot::Like, duration, PlayerMessage::LikeAnimationEnded);
        self.publish();
    }

    async fn apply(&mut self, input: PlayerInput) {
        let user_paused = self.machine.user_paused();
        let commands = self.machine.apply(input, Instant::now());
        for command in commands {
            self.execute(command).await;
        }
        if self.machine.user_paused() != user_paused {
            self.record_intent();
        }
        self.publish();
    }

    async fn execute(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Resolve => self.start_load().await,
            PlayerCommand::Play => {
                if let Some(session) = self.session {
                    if let Err(e) = self.ctx.decoder.play(session).await {
                        warn!(video_id = %self.entry.id, error = %e, "play failed");
                    }
                }
                self.record_intent();
            }
            PlayerCommand::Pause => {
                if let Some(session) = self.session {
                    if let Err(e) = self.ctx.decoder.pause(session).await {
                        warn!(video_id = %self.entry.id, error = %e, "pause failed");
                    }
                }
                self.record_intent();
            }
            PlayerCommand::ScheduleRetry(delay) => {
                debug!(video_id = %self.entry.id, retry = self.machine.retries(), "scheduling load retry");
                self.post_after(TimerSlot::Retry, delay, PlayerMessage::RetryElapsed);
            }
            PlayerCommand::ScheduleResume(delay) => {
                self.post_after(TimerSlot::Resume, delay, PlayerMessage::ResumeElapsed);
            }
            PlayerCommand::CancelResume => self.resume_timer.cancel(),
            PlayerCommand::Fail { attempts, reason } => {
                let err = LoadError {
                    video_id: self.entry.id.clone(),
                    attempts,
                    reason,
                };
                error!(video_id = %err.video_id, attempts, "{}", err);
                let _ = self.notices.send(PlayerNotice::LoadFailed(err));
            }
        }
    }

    async fn start_load(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        self.generation += 1;
        self.ensure_session().await;

        let generation = self.generation;
        let resolver = self.ctx.resolver.clone();
        let decoder = self.ctx.decoder.clone();
        let entry = self.entry.clone();
        let session = self.session;
        let tx = self.tx.clone();

        self.load_task = Some(tokio::spawn(async move {
            let result = async {
                let path = resolver.resolve(&entry).await?;
                let session = session.ok_or(LoadFailure {
                    reason: "no decoder session".to_string(),
                    retryable: true,
                })?;
                // Subscribed before the replace, so statuses of an earlier
                // source never count for this one.
                let status = decoder.subscribe(session).ok();
                decoder.replace(session, &path).await?;
                if let Some(status) = status {
                    wait_until_ready(status).await?;
                }
                Ok::<_, LoadFailure>(path)
            }
            .await;
            let _ = tx.send(PlayerMessage::Loaded { generation, result });
        }));
    }

    async fn ensure_session(&mut self) {
        if self.session.is_some() {
            return;
        }
        match self.ctx.decoder.create(DecoderConfig::default()).await {
            Ok(session) => {
                self.events = match self.ctx.decoder.subscribe(session) {
                    Ok(events) => Some(events),
                    Err(e) => {
                        warn!(video_id = %self.entry.id, error = %e, "decoder events unavailable");
                        None
                    }
                };
                self.session = Some(session);
            }
            Err(e) => warn!(video_id = %self.entry.id, error = %e, "failed to create decoder session"),
        }
    }

    fn record_intent(&self) {
        let intent = if self.machine.state().is_playing() {
            PlaybackIntent::Play
        } else {
            PlaybackIntent::Pause {
                by_user: self.machine.user_paused(),
            }
        };
        self.ctx
            .cache
            .update(&self.entry.id, PlaybackUpdate::intent(intent));
    }

    fn post_after(&mut self, slot: TimerSlot, delay: Duration, msg: PlayerMessage) {
        let tx = self.tx.clone();
        let timer = match slot {
            TimerSlot::Visibility => &mut self.visibility_timer,
            TimerSlot::Tap => &mut self.tap_timer,
            TimerSlot::Retry => &mut self.retry_timer,
            TimerSlot::Resume => &mut self.resume_timer,
            TimerSlot::Like => &mut self.like_timer,
        };
        timer.start(delay, async move {
            let _ = tx.send(msg);
        });
    }

    fn publish(&self) {
        self.snapshot.send_replace(PlayerSnapshot {
            video_id: self.entry.id.clone(),
            state: self.machine.state(),
            user_paused: self.machine.user_paused(),
            visible: self.machine.visible(),
            like_animation: self.like_animation,
            mounted: self.alive.load(Ordering::SeqCst),
        });
    }

    async fn teardown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        for timer in [
            &mut self.visibility_timer,
            &mut self.tap_timer,
            &mut self.retry_timer,
            &mut self.resume_timer,
            &mut self.like_timer,
        ] {
            timer.cancel();
        }
        if let Some(task) = self.load_task.take() {
            task.abort();
        }

        if let Some(session) = self.session.take() {
            if self.machine.state().is_playing() {
                let _ = self.ctx.decoder.pause(session).await;
                self.ctx.cache.update(
                    &self.entry.id,
                    PlaybackUpdate::intent(PlaybackIntent::Pause { by_user: false }),
                );
            }
            self.ctx.decoder.release(session).await;
        }
        self.like_animation = false;
        self.publish();
        debug!(video_id = %self.entry.id, "player unmounted");
    }
}

#[derive(Clone, Copy)]
enum TimerSlot {
    Visibility,
    Tap,
    Retry,
    Resume,
    Like,
}

async fn wait_until_ready(
    mut status: broadcast::Receiver<DecoderEvent>,
) -> Result<(), LoadFailure> {
    loop {
        match status.recv().await {
            Ok(DecoderEvent::StatusChange(DecoderStatus::ReadyToPlay)) => return Ok(()),
            Ok(DecoderEvent::StatusChange(DecoderStatus::Error(reason))) => {
                return Err(LoadFailure {
                    reason,
                    retryable: true,
                })
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                return Err(LoadFailure {
                    reason: "decoder session closed".to_string(),
                    retryable: true,
                })
            }
        }
    }
}

async fn next_event(events: &mut Option<broadcast::Receiver<DecoderEvent>>) -> Option<DecoderEvent> {
    loop {
        let Some(rx) = events.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "player lagged behind decoder events");
            }
            Err(RecvError::Closed) => {
                *events = None;
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlaybackCacheConfig, ResolverConfig};
    use crate::domain::catalog::fixtures::entry;
    use crate::ports::storage::MockBlobStorePort;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::AtomicU64;
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create,
        Replace(PathBuf),
        Play,
        Pause,
        Release,
    }

    /// Decoder that records calls and reports every replaced source playable.
    #[derive(Default)]
    struct FakeDecoder {
        next_id: AtomicU64,
        calls: Mutex<Vec<Call>>,
        channels: Mutex<HashMap<u64, broadcast::Sender<DecoderEvent>>>,
        /// Leave `ReadyToPlay` to the test instead of reporting it on replace
        defer_ready: AtomicBool,
    }

    impl FakeDecoder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.lock().iter().filter(|c| *c == call).count()
        }

        fn emit(&self, event: DecoderEvent) {
            for sender in self.channels.lock().values() {
                let _ = sender.send(event.clone());
            }
        }
    }

    #[async_trait]
    impl DecodeBackend for FakeDecoder {
        async fn create(&self, _config: DecoderConfig) -> Result<DecoderHandle, DecoderError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let (tx, _) = broadcast::channel(16);
            self.channels.lock().insert(id, tx);
            self.calls.lock().push(Call::Create);
            Ok(DecoderHandle(id))
        }

        async fn replace(&self, handle: DecoderHandle, source: &Path) -> Result<(), DecoderError> {
            self.calls.lock().push(Call::Replace(source.to_path_buf()));
            if self.defer_ready.load(Ordering::SeqCst) {
                return Ok(());
            }
            if let Some(tx) = self.channels.lock().get(&handle.0) {
                let _ = tx.send(DecoderEvent::StatusChange(DecoderStatus::ReadyToPlay));
            }
            Ok(())
        }

        async fn play(&self, _handle: DecoderHandle) -> Result<(), DecoderError> {
            self.calls.lock().push(Call::Play);
            Ok(())
        }

        async fn pause(&self, _handle: DecoderHandle) -> Result<(), DecoderError> {
            self.calls.lock().push(Call::Pause);
            Ok(())
        }

        async fn release(&self, handle: DecoderHandle) {
            self.channels.lock().remove(&handle.0);
            self.calls.lock().push(Call::Release);
        }

        fn subscribe(
            &self,
            handle: DecoderHandle,
        ) -> Result<broadcast::Receiver<DecoderEvent>, DecoderError> {
            self.channels
                .lock()
                .get(&handle.0)
                .map(|tx| tx.subscribe())
                .ok_or(DecoderError::UnknownSession(handle.0))
        }
    }

    struct Harness {
        decoder: Arc<FakeDecoder>,
        cache: Arc<PlaybackCache>,
        ctx: PlayerContext<FakeDecoder, MockBlobStorePort>,
        _dir: TempDir,
    }

    /// Context whose videos `ids` are already on disk.
    fn harness(ids: &[&str], store: MockBlobStorePort) -> Harness {
        let dir = tempdir().unwrap();
        for id in ids {
            std::fs::write(dir.path().join(format!("{}.mp4", id)), b"video").unwrap();
        }
        let decoder = Arc::new(FakeDecoder::default());
        let cache = Arc::new(PlaybackCache::new(PlaybackCacheConfig::default()));
        let resolver = BlobResolver::new(
            Arc::new(store),
            ResolverConfig {
                cache_dir: dir.path().to_path_buf(),
                min_valid_file_size: 10_000,
            },
        );
        let ctx = PlayerContext {
            decoder: decoder.clone(),
            resolver,
            cache: cache.clone(),
            config: PlayerConfig::default(),
        };
        Harness {
            decoder,
            cache,
            ctx,
            _dir: dir,
        }
    }

    async fn wait_for_state(handle: &PlayerHandle, state: PlayerState) {
        let mut rx = handle.watch();
        rx.wait_for(|s| s.state == state).await.unwrap();
    }

    async fn playing_player(h: &Harness, id: &str) -> PlayerHandle {
        let handle = mount(h.ctx.clone(), entry(id, 1));
        handle.set_visible(true);
        wait_for_state(&handle, PlayerState::Playing).await;
        handle
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_player_loads_and_plays() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        let calls = h.decoder.calls();
        assert_eq!(calls[0], Call::Create);
        assert!(matches!(&calls[1], Call::Replace(p) if p.ends_with("v1.mp4")));
        assert_eq!(calls[2], Call::Play);
        assert_eq!(h.cache.get("v1").unwrap().intent, PlaybackIntent::Play);
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_visibility_flicker_is_debounced() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        handle.set_visible(false);
        tokio::time::sleep(ms(100)).await;
        handle.set_visible(true);
        tokio::time::sleep(ms(1000)).await;

        assert_eq!(h.decoder.count(&Call::Pause), 0);
        assert_eq!(h.decoder.count(&Call::Play), 1);
        assert_eq!(handle.snapshot().state, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_player_pauses_and_resumes() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        handle.set_visible(false);
        wait_for_state(&handle, PlayerState::Paused).await;
        assert!(!handle.snapshot().user_paused);

        handle.set_visible(true);
        wait_for_state(&handle, PlayerState::Playing).await;
        assert_eq!(h.decoder.count(&Call::Play), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tap_pauses_after_double_tap_window() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        handle.tap();
        tokio::time::sleep(ms(200)).await;
        assert_eq!(h.decoder.count(&Call::Pause), 0);

        wait_for_state(&handle, PlayerState::Paused).await;
        assert!(handle.snapshot().user_paused);
        assert!(h.cache.get("v1").unwrap().is_user_paused());

        // A user pause survives visibility changes.
        handle.set_visible(false);
        handle.set_visible(true);
        tokio::time::sleep(ms(1000)).await;
        assert_eq!(h.decoder.count(&Call::Play), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_tap_likes_without_toggling() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;
        let mut notices = handle.notices();

        handle.tap();
        tokio::time::sleep(ms(100)).await;
        handle.tap();

        let notice = notices.recv().await.unwrap();
        assert_eq!(
            notice,
            PlayerNotice::LikeRequested {
                video_id: "v1".into()
            }
        );
        assert!(handle.snapshot().like_animation);

        tokio::time::sleep(ms(1500)).await;
        assert!(!handle.snapshot().like_animation);
        assert_eq!(h.decoder.count(&Call::Pause), 0);
        assert_eq!(handle.snapshot().state, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffering_resume_is_gated_since_last_play() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        tokio::time::sleep(ms(100)).await;
        h.decoder.emit(DecoderEvent::BufferingChange(true));
        tokio::time::sleep(ms(100)).await;
        h.decoder.emit(DecoderEvent::BufferingChange(false));

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(h.decoder.count(&Call::Pause), 1);
        assert_eq!(h.decoder.count(&Call::Play), 1);
        assert!(matches!(
            handle.snapshot().state,
            PlayerState::Buffering { .. }
        ));

        tokio::time::sleep(ms(900)).await;
        assert_eq!(h.decoder.count(&Call::Play), 2);
        assert_eq!(handle.snapshot().state, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_failures_retry_then_surface_load_error() {
        let mut store = MockBlobStorePort::new();
        store
            .expect_fetch_url()
            .times(4)
            .returning(|p| Ok(format!("mem://{}", p)));
        store
            .expect_download_to_local()
            .times(4)
            .returning(|_, _| Err("network unreachable".into()));
        let h = harness(&[], store);

        let handle = mount(h.ctx.clone(), entry("v9", 1));
        let mut notices = handle.notices();
        handle.set_visible(true);

        let notice = notices.recv().await.unwrap();
        match notice {
            PlayerNotice::LoadFailed(err) => {
                assert_eq!(err.video_id, "v9");
                assert_eq!(err.attempts, 4);
            }
            other => panic!("unexpected notice {:?}", other),
        }
        assert!(handle.snapshot().state.is_failed());
        assert_eq!(h.decoder.count(&Call::Play), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmounted_player_ignores_input() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;
        let mut rx = handle.watch();

        handle.unmount();
        rx.wait_for(|s| !s.mounted).await.unwrap();
        assert!(!handle.is_mounted());

        handle.tap();
        handle.set_visible(false);
        tokio::time::sleep(ms(1000)).await;

        let calls = h.decoder.calls();
        assert_eq!(calls.last(), Some(&Call::Release));
        assert_eq!(h.decoder.count(&Call::Pause), 1);
        assert_eq!(
            h.cache.get("v1").unwrap().intent,
            PlaybackIntent::Pause { by_user: false }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_unmounts() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;
        let mut rx = handle.watch();
        let clone = handle.clone();

        drop(handle);
        tokio::time::sleep(ms(10)).await;
        assert!(clone.is_mounted());

        drop(clone);
        rx.wait_for(|s| !s.mounted).await.unwrap();
        assert_eq!(h.decoder.calls().last(), Some(&Call::Release));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_keeps_user_pause() {
        let h = harness(&["v1"], MockBlobStorePort::new());
        h.cache.update(
            "v1",
            PlaybackUpdate::intent(PlaybackIntent::Pause { by_user: true }),
        );

        let handle = mount(h.ctx.clone(), entry("v1", 1));
        handle.set_visible(true);
        wait_for_state(&handle, PlayerState::Ready).await;
        tokio::time::sleep(ms(1000)).await;

        assert_eq!(handle.snapshot().state, PlayerState::Ready);
        assert!(handle.snapshot().user_paused);
        assert_eq!(h.decoder.count(&Call::Play), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_change_reloads_new_video() {
        let h = harness(&["v1", "v2"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        handle.set_entry(entry("v2", 2));
        let mut rx = handle.watch();
        rx.wait_for(|s| s.video_id == "v2" && s.state == PlayerState::Playing)
            .await
            .unwrap();

        let replaced: Vec<_> = h
            .decoder
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Replace(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(replaced.len(), 2);
        assert!(replaced[1].ends_with("v2.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_ready_status_does_not_start_next_video() {
        let h = harness(&["v1", "v2"], MockBlobStorePort::new());
        let handle = playing_player(&h, "v1").await;

        // A status still queued from v1 when the entry changes.
        h.decoder.defer_ready.store(true, Ordering::SeqCst);
        h.decoder
            .emit(DecoderEvent::StatusChange(DecoderStatus::ReadyToPlay));
        handle.set_entry(entry("v2", 2));

        tokio::time::sleep(ms(1000)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.video_id, "v2");
        assert!(matches!(snapshot.state, PlayerState::Loading { .. }));
        assert_eq!(h.decoder.count(&Call::Play), 1);

        h.decoder
            .emit(DecoderEvent::StatusChange(DecoderStatus::ReadyToPlay));
        wait_for_state(&handle, PlayerState::Playing).await;
        assert_eq!(h.decoder.count(&Call::Play), 2);
    }
}
