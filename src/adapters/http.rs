use crate::adapters::stream::stream_to_file;
use crate::ports::storage::BlobStorePort;
use async_trait::async_trait;
use std::error::Error;
use std::path::Path;
use tracing::debug;

/// Blob store served over HTTP at `<base_url>/<logical path>`.
#[derive(Clone, Debug)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStorePort for HttpBlobStore {
    async fn fetch_url(&self, logical_path: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let path = logical_path.trim_start_matches('/');
        if path.is_empty() || path.split('/').any(|segment| segment == "..") {
            return Err(format!("invalid blob path {:?}", logical_path).into());
        }
        Ok(format!("{}/{}", self.base_url, path))
    }

    async fn download_to_local(
        &self,
        url: &str,
        local_path: &Path,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let written = stream_to_file(local_path, response.bytes_stream()).await?;
        debug!(url = %url, path = ?local_path, bytes = written, "downloaded blob");
        Ok(())
    }
}
