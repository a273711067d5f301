use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing state of a video as written by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Optional structured metadata attached to a video after analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    /// Hashtags as stored, usually with a leading `#`
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// One video's metadata record as exposed to the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Unique, stable identifier
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Logical storage path of the playable blob (never a URL)
    #[serde(default)]
    pub blob_ref: Option<String>,
    pub status: ProcessingStatus,
    #[serde(default)]
    pub like_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<VideoMetadata>,
}

impl CatalogEntry {
    /// Only completed entries may be shown in a feed.
    pub fn is_displayable(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }

    pub fn hashtags(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.hashtags.as_slice())
            .unwrap_or(&[])
    }

    /// The blob reference, if present and non-empty.
    pub fn playable_ref(&self) -> Option<&str> {
        self.blob_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Opaque user identifier, only used to scope personalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque pagination cursor handed back by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filter understood by the catalog query interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogFilter {
    /// All completed entries, newest first
    None,
    /// Entries whose hashtags intersect this set
    Hashtags(Vec<String>),
    /// Candidate entries for a personalized feed
    Requester(UserId),
}

/// One page of catalog results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub entries: Vec<CatalogEntry>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}


#[cfg(test)]
mod tests {
    use super::fixtures::entry;
    use super::*;

    #[test]
    fn test_only_completed_entries_are_displayable() {
        let mut e = entry("a", 1);
        assert!(e.is_displayable());
        e.status = ProcessingStatus::Processing;
        assert!(!e.is_displayable());
    }

    #[test]
    fn test_blank_blob_ref_is_not_playable() {
        let mut e = entry("a", 1);
        e.blob_ref = Some("   ".to_string());
        assert_eq!(e.playable_ref(), None);
        e.blob_ref = None;
        assert_eq!(e.playable_ref(), None);
    }

    #[test]
    fn test_entry_deserializes_from_manifest_json() {
        let json = r##"{
            "id": "v1",
            "title": "Waves",
            "blob_ref": "videos/v1.mp4",
            "status": "completed",
            "like_count": 3,
            "created_at": "2024-05-01T10:00:00Z",
            "metadata": { "duration": 12.5, "hashtags": ["#ocean"] }
        }"##;
        let e: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.status, ProcessingStatus::Completed);
        assert_eq!(e.hashtags(), ["#ocean".to_string()]);
        assert_eq!(e.description, None);
    }
}
