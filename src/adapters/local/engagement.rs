use crate::domain::catalog::UserId;
use crate::ports::engagement::EngagementPort;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::error::Error;

/// Engagement store kept in memory, keyed by `(user, video)`.
#[derive(Default)]
pub struct MemoryEngagement {
    likes: Mutex<HashSet<(String, String)>>,
    saves: Mutex<HashSet<(String, String)>>,
}

impl MemoryEngagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_liked(&self, user: &UserId, video_id: &str) -> bool {
        self.likes
            .lock()
            .contains(&(user.0.clone(), video_id.to_string()))
    }

    pub fn is_saved(&self, user: &UserId, video_id: &str) -> bool {
        self.saves
            .lock()
            .contains(&(user.0.clone(), video_id.to_string()))
    }
}

fn set_flag(set: &Mutex<HashSet<(String, String)>>, user: &UserId, video_id: &str, on: bool) {
    let key = (user.0.clone(), video_id.to_string());
    let mut set = set.lock();
    if on {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}

#[async_trait]
impl EngagementPort for MemoryEngagement {
    async fn set_liked(
        &self,
        user: &UserId,
        video_id: &str,
        liked: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        set_flag(&self.likes, user, video_id, liked);
        Ok(())
    }

    async fn set_saved(
        &self,
        user: &UserId,
        video_id: &str,
        saved: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        set_flag(&self.saves, user, video_id, saved);
        Ok(())
    }
}
