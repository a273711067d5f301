//! Optimistic like/save overlays on top of the catalog.

use crate::domain::catalog::{CatalogEntry, UserId};
use crate::domain::errors::EngagementError;
use crate::domain::mutation::{Engagement, PendingMutation};
use crate::ports::engagement::EngagementPort;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy)]
enum Field {
    Liked(bool),
    Saved(bool),
}

/// Per-viewer engagement overlays, keyed by video id.
///
/// A change is shown right away and rolled back if the remote call fails.
/// The catalog itself is never written.
pub struct EngagementOverlay<E> {
    port: Arc<E>,
    user: UserId,
    overlays: Mutex<HashMap<String, Engagement>>,
}

impl<E> EngagementOverlay<E>
where
    E: EngagementPort,
{
    pub fn new(port: Arc<E>, user: UserId) -> Self {
        Self {
            port,
            user,
            overlays: Mutex::new(HashMap::new()),
        }
    }

    /// Current engagement of an entry, overlay first, catalog counters otherwise.
    pub fn engagement(&self, entry: &CatalogEntry) -> Engagement {
        self.overlays
            .lock()
            .get(&entry.id)
            .copied()
            .unwrap_or(Engagement {
                like_count: entry.like_count,
                ..Default::default()
            })
    }

    pub async fn toggle_like(&self, entry: &CatalogEntry) -> Result<Engagement, EngagementError> {
        let liked = !self.engagement(entry).liked;
        self.apply(entry, Field::Liked(liked)).await
    }

    /// Like only; a video already liked stays liked. Used by double taps.
    pub async fn like(&self, entry: &CatalogEntry) -> Result<Engagement, EngagementError> {
        let current = self.engagement(entry);
        if current.liked {
            return Ok(current);
        }
        self.apply(entry, Field::Liked(true)).await
    }

    pub async fn toggle_save(&self, entry: &CatalogEntry) -> Result<Engagement, EngagementError> {
        let saved = !self.engagement(entry).saved;
        self.apply(entry, Field::Saved(saved)).await
    }

    async fn apply(&self, entry: &CatalogEntry, field: Field) -> Result<Engagement, EngagementError> {
        let mutation = {
            let mut overlays = self.overlays.lock();
            let prior = overlays.get(&entry.id).copied().unwrap_or(Engagement {
                like_count: entry.like_count,
                ..Default::default()
            });
            let proposed = match field {
                Field::Liked(liked) => prior.with_liked(liked),
                Field::Saved(saved) => prior.with_saved(saved),
            };
            overlays.insert(entry.id.clone(), proposed);
            PendingMutation::new(prior, proposed)
        };

        let proposed = *mutation.proposed();
        let outcome = match field {
            Field::Liked(liked) => self.port.set_liked(&self.user, &entry.id, liked).await,
            Field::Saved(saved) => self.port.set_saved(&self.user, &entry.id, saved).await,
        };

        let (kept, result) = match mutation.settle(outcome) {
            Ok(kept) => {
                debug!(video_id = %entry.id, liked = kept.liked, saved = kept.saved, "engagement saved");
                (kept, Ok(kept))
            }
            Err((prior, source)) => {
                warn!(video_id = %entry.id, error = %source, "engagement update failed, rolling back");
                let err = EngagementError {
                    video_id: entry.id.clone(),
                    source,
                };
                (prior, Err(err))
            }
        };

        // A newer mutation on the same entry wins over this one.
        let mut overlays = self.overlays.lock();
        if overlays.get(&entry.id) == Some(&proposed) {
            overlays.insert(entry.id.clone(), kept);
        }
        result
    }
}
