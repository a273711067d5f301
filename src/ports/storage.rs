use async_trait::async_trait;
use std::error::Error;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStorePort: Send + Sync {
    /// Resolve a logical blob path to a URL the store can serve it from
    async fn fetch_url(&self, logical_path: &str) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// Download the blob behind `url` to a local path
    async fn download_to_local(
        &self,
        url: &str,
        local_path: &Path,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}
