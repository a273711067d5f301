//! Bounded working set of the feed.

use crate::domain::catalog::CatalogEntry;
use std::collections::{HashSet, VecDeque};

/// Ids already handed to the feed, bounded with FIFO eviction.
///
/// Independent of the window bound: an id can stay "seen" long after its
/// entry left the window.
#[derive(Debug, Clone)]
pub struct SeenIdSet {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenIdSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Ordered entries currently held in memory. Never holds duplicate ids;
/// overflow is dropped from the head.
#[derive(Debug, Clone)]
pub struct FeedWindow {
    entries: VecDeque<CatalogEntry>,
    capacity: usize,
}

impl FeedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append entries whose ids are not already present.
    /// Returns `(appended, dropped_from_head)`.
    pub fn extend(&mut self, batch: Vec<CatalogEntry>) -> (usize, usize) {
        let mut appended = 0;
        for entry in batch {
            if self.contains(&entry.id) {
                continue;
            }
            self.entries.push_back(entry);
            appended += 1;
        }

        let mut dropped = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            dropped += 1;
        }
        (appended, dropped)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn to_vec(&self) -> Vec<CatalogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::fixtures::entry;

    #[test]
    fn test_seen_ids_evict_oldest_first() {
        let mut seen = SeenIdSet::new(3);
        for id in ["a", "b", "c", "d"] {
            assert!(seen.insert(id));
        }
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains("a"));
        assert!(seen.contains("d"));
        assert!(!seen.insert("d"));
    }

    #[test]
    fn test_window_skips_duplicates_and_truncates_head() {
        let mut window = FeedWindow::new(4);
        let batch = |ids: &[&str]| ids.iter().map(|id| entry(id, 1)).collect::<Vec<_>>();

        assert_eq!(window.extend(batch(&["1", "2", "3"])), (3, 0));
        assert_eq!(window.extend(batch(&["3", "4", "5", "5"])), (2, 1));
        assert_eq!(window.ids(), vec!["2", "3", "4", "5"]);
    }
}
