use crate::domain::catalog::UserId;
use async_trait::async_trait;
use std::error::Error;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngagementPort: Send + Sync {
    /// Persist the like flag of `user` on a video
    async fn set_liked(
        &self,
        user: &UserId,
        video_id: &str,
        liked: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Persist the saved flag of `user` on a video
    async fn set_saved(
        &self,
        user: &UserId,
        video_id: &str,
        saved: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}
