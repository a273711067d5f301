use crate::domain::errors::DecoderError;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::broadcast;

/// Identifies one decode session of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub looping: bool,
    pub muted: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            looping: true,
            muted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderStatus {
    Idle,
    Loading,
    ReadyToPlay,
    Error(String),
}

/// Events a backend publishes for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    PlayingChange(bool),
    StatusChange(DecoderStatus),
    BufferingChange(bool),
}

#[async_trait]
pub trait DecodeBackend: Send + Sync {
    /// Create a decode session
    async fn create(&self, config: DecoderConfig) -> Result<DecoderHandle, DecoderError>;

    /// Replace the source of a session with a local file
    async fn replace(&self, handle: DecoderHandle, source: &Path) -> Result<(), DecoderError>;

    async fn play(&self, handle: DecoderHandle) -> Result<(), DecoderError>;

    async fn pause(&self, handle: DecoderHandle) -> Result<(), DecoderError>;

    /// Release a session. Unknown handles are ignored.
    async fn release(&self, handle: DecoderHandle);

    /// Subscribe to `playingChange`, `statusChange` and `bufferingChange` events
    fn subscribe(
        &self,
        handle: DecoderHandle,
    ) -> Result<broadcast::Receiver<DecoderEvent>, DecoderError>;
}
