use crate::domain::catalog::{CatalogFilter, Cursor, Page, UserId};
use async_trait::async_trait;
use std::error::Error;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogQueryPort: Send + Sync {
    /// Query one page of entries. `cursor` is `None` for the first page.
    async fn query_entries(
        &self,
        filter: &CatalogFilter,
        cursor: Option<Cursor>,
        page_size: usize,
    ) -> Result<Page, Box<dyn Error + Send + Sync>>;

    /// Hashtags the user follows, used to personalize the feed
    async fn followed_hashtags(
        &self,
        user: &UserId,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>>;
}
