//! Failure taxonomy of the feed core.
//!
//! Every failure is scoped to one feed item or one fetch; none of these is
//! fatal to the process.

use thiserror::Error;

/// Failure to turn a catalog entry into a local playable file.
///
/// `Clone` so a shared in-flight resolution can hand the same outcome to
/// every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("video {video_id} has no playable blob reference")]
    MissingReference { video_id: String },

    #[error("failed to download video {video_id}: {message}")]
    Download { video_id: String, message: String },
}

impl ResolveError {
    pub fn video_id(&self) -> &str {
        match self {
            ResolveError::MissingReference { video_id } => video_id,
            ResolveError::Download { video_id, .. } => video_id,
        }
    }

    /// Missing references never succeed on a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Download { .. })
    }
}

/// Terminal load failure of one player, after retries were exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("video {video_id} failed to load after {attempts} attempt(s): {reason}")]
pub struct LoadError {
    pub video_id: String,
    pub attempts: u32,
    pub reason: String,
}

/// Catalog fetch failure. The page is simply not advanced.
#[derive(Debug, Error)]
#[error("catalog query failed (cursor: {cursor}): {source}")]
pub struct QueryError {
    pub cursor: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Failure reported by a decode backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecoderError {
    #[error("decoder session {0} does not exist")]
    UnknownSession(u64),

    #[error("decoder rejected source: {0}")]
    Rejected(String),

    #[error("decoder backend error: {0}")]
    Backend(String),
}

/// Failure of a remote like/save call. The optimistic overlay is rolled back.
#[derive(Debug, Error)]
#[error("failed to update engagement for video {video_id}: {source}")]
pub struct EngagementError {
    pub video_id: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_download_errors_are_retryable() {
        let missing = ResolveError::MissingReference {
            video_id: "v1".into(),
        };
        let download = ResolveError::Download {
            video_id: "v1".into(),
            message: "timeout".into(),
        };
        assert!(!missing.is_retryable());
        assert!(download.is_retryable());
        assert_eq!(download.video_id(), "v1");
    }

    #[test]
    fn test_query_error_carries_cursor_context() {
        let err = QueryError {
            cursor: "<start>".into(),
            source: "offline".into(),
        };
        assert_eq!(
            err.to_string(),
            "catalog query failed (cursor: <start>): offline"
        );
    }
}
