use crate::adapters::stream::stream_to_file;
use crate::ports::storage::BlobStorePort;
use async_trait::async_trait;
use std::error::Error;
use std::path::{Component, Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Blob store over a local directory.
///
/// Logical paths are relative to `root`; the fetch URL of a blob is its
/// absolute file path.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Logical paths must stay below the store root.
fn path_is_valid(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl BlobStorePort for FsBlobStore {
    async fn fetch_url(&self, logical_path: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let relative = Path::new(logical_path);
        if !path_is_valid(relative) {
            return Err(format!("invalid blob path {:?}", logical_path).into());
        }

        let path = self.root.join(relative);
        if !tokio::fs::try_exists(&path).await? {
            return Err(format!("blob {:?} not found", logical_path).into());
        }
        Ok(path.to_string_lossy().into_owned())
    }

    async fn download_to_local(
        &self,
        url: &str,
        local_path: &Path,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let source = tokio::fs::File::open(url).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let written = stream_to_file(local_path, ReaderStream::new(source)).await?;
        debug!(url = %url, path = ?local_path, bytes = written, "copied blob");
        Ok(())
    }
}
