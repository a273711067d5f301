//! Optimistic local mutations.

use serde::{Deserialize, Serialize};

/// A locally applied change awaiting confirmation from the remote store.
///
/// The proposed value is shown right away; the mutation is then either
/// committed or rolled back to the value observed before it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending mutation must be settled"]
pub struct PendingMutation<T> {
    prior: T,
    proposed: T,
}

impl<T> PendingMutation<T> {
    pub fn new(prior: T, proposed: T) -> Self {
        Self { prior, proposed }
    }

    pub fn proposed(&self) -> &T {
        &self.proposed
    }

    pub fn prior(&self) -> &T {
        &self.prior
    }

    pub fn commit(self) -> T {
        self.proposed
    }

    pub fn rollback(self) -> T {
        self.prior
    }

    /// Commits on `Ok`, rolls back on `Err`, returning the value to keep.
    pub fn settle<E>(self, outcome: Result<(), E>) -> Result<T, (T, E)> {
        match outcome {
            Ok(()) => Ok(self.commit()),
            Err(e) => Err((self.rollback(), e)),
        }
    }
}

/// Per-viewer engagement with one video, layered over the catalog counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub liked: bool,
    pub saved: bool,
    pub like_count: u64,
}

impl Engagement {
    pub fn with_liked(self, liked: bool) -> Self {
        if liked == self.liked {
            return self;
        }
        let like_count = if liked {
            self.like_count.saturating_add(1)
        } else {
            self.like_count.saturating_sub(1)
        };
        Self {
            liked,
            like_count,
            ..self
        }
    }

    pub fn with_saved(self, saved: bool) -> Self {
        Self { saved, ..self }
    }
}
