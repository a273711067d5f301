use crate::domain::errors::DecoderError;
use crate::ports::decoder::{
    DecodeBackend, DecoderConfig, DecoderEvent, DecoderHandle, DecoderStatus,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

const EVENT_CAPACITY: usize = 32;

struct Session {
    config: DecoderConfig,
    source: Option<PathBuf>,
    playing: bool,
    events: broadcast::Sender<DecoderEvent>,
}

/// Decode backend that renders nothing.
///
/// Any existing, non-empty file is accepted as playable. Used by the
/// simulator and by integration tests.
#[derive(Default)]
pub struct HeadlessDecoder {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Session>>,
}

impl HeadlessDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_playing(&self, handle: DecoderHandle) -> bool {
        self.sessions
            .lock()
            .get(&handle.0)
            .is_some_and(|s| s.playing)
    }

    /// Push a buffering change, as a network stall would.
    pub fn set_buffering(&self, handle: DecoderHandle, buffering: bool) -> Result<(), DecoderError> {
        self.emit(handle, DecoderEvent::BufferingChange(buffering))
    }

    fn emit(&self, handle: DecoderHandle, event: DecoderEvent) -> Result<(), DecoderError> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(&handle.0)
            .ok_or(DecoderError::UnknownSession(handle.0))?;
        trace!(session = handle.0, event = ?event, "decoder event");
        let _ = session.events.send(event);
        Ok(())
    }

    fn set_playing(&self, handle: DecoderHandle, playing: bool) -> Result<(), DecoderError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&handle.0)
            .ok_or(DecoderError::UnknownSession(handle.0))?;
        if session.source.is_none() {
            return Err(DecoderError::Rejected("no source loaded".to_string()));
        }
        if session.playing != playing {
            session.playing = playing;
            let _ = session.events.send(DecoderEvent::PlayingChange(playing));
        }
        Ok(())
    }
}

#[async_trait]
impl DecodeBackend for HeadlessDecoder {
    async fn create(&self, config: DecoderConfig) -> Result<DecoderHandle, DecoderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        self.sessions.lock().insert(
            id,
            Session {
                config,
                source: None,
                playing: false,
                events,
            },
        );
        debug!(session = id, looping = config.looping, muted = config.muted, "decoder session created");
        Ok(DecoderHandle(id))
    }

    async fn replace(&self, handle: DecoderHandle, source: &Path) -> Result<(), DecoderError> {
        self.emit(handle, DecoderEvent::StatusChange(DecoderStatus::Loading))?;

        let playable = match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
            Ok(_) => Err(format!("{:?} is not a playable file", source)),
            Err(e) => Err(format!("{:?}: {}", source, e)),
        };

        let status = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(&handle.0)
                .ok_or(DecoderError::UnknownSession(handle.0))?;
            session.playing = false;
            let status = match &playable {
                Ok(()) => {
                    session.source = Some(source.to_path_buf());
                    DecoderStatus::ReadyToPlay
                }
                Err(reason) => {
                    session.source = None;
                    DecoderStatus::Error(reason.clone())
                }
            };
            let _ = session.events.send(DecoderEvent::StatusChange(status.clone()));
            status
        };
        debug!(session = handle.0, status = ?status, "decoder source replaced");
        playable.map_err(DecoderError::Rejected)
    }

    async fn play(&self, handle: DecoderHandle) -> Result<(), DecoderError> {
        self.set_playing(handle, true)
    }

    async fn pause(&self, handle: DecoderHandle) -> Result<(), DecoderError> {
        self.set_playing(handle, false)
    }

    async fn release(&self, handle: DecoderHandle) {
        if let Some(session) = self.sessions.lock().remove(&handle.0) {
            debug!(session = handle.0, looping = session.config.looping, "decoder session released");
        }
    }

    fn subscribe(
        &self,
        handle: DecoderHandle,
    ) -> Result<broadcast::Receiver<DecoderEvent>, DecoderError> {
        self.sessions
            .lock()
            .get(&handle.0)
            .map(|s| s.events.subscribe())
            .ok_or(DecoderError::UnknownSession(handle.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_replace_reports_ready_for_existing_file() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("v1.mp4");
        std::fs::write(&video, b"moov").unwrap();

        let decoder = HeadlessDecoder::new();
        let handle = decoder.create(DecoderConfig::default()).await.unwrap();
        let mut events = decoder.subscribe(handle).unwrap();

        decoder.replace(handle, &video).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            DecoderEvent::StatusChange(DecoderStatus::Loading)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            DecoderEvent::StatusChange(DecoderStatus::ReadyToPlay)
        );

        decoder.play(handle).await.unwrap();
        assert!(decoder.is_playing(handle));
        assert_eq!(events.recv().await.unwrap(), DecoderEvent::PlayingChange(true));
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let dir = tempdir().unwrap();
        let decoder = HeadlessDecoder::new();
        let handle = decoder.create(DecoderConfig::default()).await.unwrap();

        let err = decoder
            .replace(handle, &dir.path().join("missing.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, DecoderError::Rejected(_)));
        assert!(decoder.play(handle).await.is_err());
    }

    #[tokio::test]
    async fn test_release_forgets_session() {
        let decoder = HeadlessDecoder::new();
        let handle = decoder.create(DecoderConfig::default()).await.unwrap();
        decoder.release(handle).await;
        decoder.release(handle).await;

        assert_eq!(decoder.session_count(), 0);
        assert_eq!(
            decoder.subscribe(handle).unwrap_err(),
            DecoderError::UnknownSession(handle.0)
        );
    }
}
