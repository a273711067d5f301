use crate::domain::catalog::{CatalogEntry, CatalogFilter, Cursor, Page, UserId};
use crate::ports::catalog::CatalogQueryPort;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::Path;
use tracing::info;

/// JSON document a [`MemoryCatalog`] is loaded from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogManifest {
    pub entries: Vec<CatalogEntry>,
    /// Followed hashtags per user id
    #[serde(default)]
    pub follows: HashMap<String, Vec<String>>,
}

/// Catalog held in memory, newest entries first. Cursors are offsets.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    entries: Vec<CatalogEntry>,
    follows: HashMap<String, Vec<String>>,
}

impl MemoryCatalog {
    pub fn new(manifest: CatalogManifest) -> Self {
        let mut entries = manifest.entries;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self {
            entries,
            follows: manifest.follows,
        }
    }

    pub async fn from_json_file(path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let manifest: CatalogManifest = serde_json::from_str(&raw)?;
        info!(path = ?path, entries = manifest.entries.len(), "loaded catalog manifest");
        Ok(Self::new(manifest))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matches(entry: &CatalogEntry, filter: &CatalogFilter) -> bool {
        if !entry.is_displayable() {
            return false;
        }
        match filter {
            CatalogFilter::None | CatalogFilter::Requester(_) => true,
            CatalogFilter::Hashtags(tags) => {
                let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
                entry.hashtags().iter().any(|t| wanted.contains(t.as_str()))
            }
        }
    }
}

#[async_trait]
impl CatalogQueryPort for MemoryCatalog {
    async fn query_entries(
        &self,
        filter: &CatalogFilter,
        cursor: Option<Cursor>,
        page_size: usize,
    ) -> Result<Page, Box<dyn Error + Send + Sync>> {
        let offset = match &cursor {
            Some(Cursor(raw)) => raw
                .parse::<usize>()
                .map_err(|_| format!("invalid cursor {:?}", raw))?,
            None => 0,
        };

        let mut matching = self
            .entries
            .iter()
            .filter(|e| Self::matches(e, filter))
            .skip(offset);
        let entries: Vec<CatalogEntry> = matching.by_ref().take(page_size).cloned().collect();
        let has_more = matching.next().is_some();
        let next_cursor = has_more.then(|| Cursor((offset + entries.len()).to_string()));

        Ok(Page {
            entries,
            next_cursor,
            has_more,
        })
    }

    async fn followed_hashtags(
        &self,
        user: &UserId,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        Ok(self.follows.get(&user.0).cloned().unwrap_or_default())
    }
}
