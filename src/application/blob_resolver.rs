//! Resolves catalog entries to local playable files.
//!
//! Resolved paths live in an in-memory map shared by every clone of the
//! resolver. Concurrent resolutions of the same id share one in-flight
//! future, so a video is downloaded at most once at a time.

use crate::config::ResolverConfig;
use crate::domain::catalog::CatalogEntry;
use crate::domain::errors::ResolveError;
use crate::ports::storage::BlobStorePort;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PARTIAL_SUFFIX: &str = "part";
const DEFAULT_EXTENSION: &str = "mp4";

type InFlight = Shared<BoxFuture<'static, Result<PathBuf, ResolveError>>>;

#[derive(Default)]
struct ResolverState {
    resolved: HashMap<String, PathBuf>,
    in_flight: HashMap<String, InFlight>,
}

/// Outcome of a cache cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed: usize,
    pub bytes_freed: u64,
}

pub struct BlobResolver<S> {
    store: Arc<S>,
    config: ResolverConfig,
    state: Arc<Mutex<ResolverState>>,
}

impl<S> Clone for BlobResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S> BlobResolver<S>
where
    S: BlobStorePort + 'static,
{
    pub fn new(store: Arc<S>, config: ResolverConfig) -> Self {
        Self {
            store,
            config,
            state: Arc::new(Mutex::new(ResolverState::default())),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Resolve an entry to a local file, downloading it if needed.
    pub async fn resolve(&self, entry: &CatalogEntry) -> Result<PathBuf, ResolveError> {
        let reference = entry
            .playable_ref()
            .ok_or_else(|| ResolveError::MissingReference {
                video_id: entry.id.clone(),
            })?
            .to_string();

        let pending = {
            let mut state = self.state.lock();
            if let Some(path) = state.resolved.get(&entry.id) {
                return Ok(path.clone());
            }
            match state.in_flight.get(&entry.id) {
                Some(pending) => {
                    debug!(video_id = %entry.id, "joining in-flight resolution");
                    pending.clone()
                }
                None => {
                    let pending = fetch(
                        self.store.clone(),
                        entry.id.clone(),
                        reference.clone(),
                        self.local_path(&entry.id, &reference),
                    )
                    .boxed()
                    .shared();
                    state.in_flight.insert(entry.id.clone(), pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.state.lock();
        if state
            .in_flight
            .get(&entry.id)
            .is_some_and(|current| current.ptr_eq(&pending))
        {
            state.in_flight.remove(&entry.id);
        }
        if let Ok(path) = &result {
            state.resolved.insert(entry.id.clone(), path.clone());
        }
        result
    }

    pub fn cached_path(&self, video_id: &str) -> Option<PathBuf> {
        self.state.lock().resolved.get(video_id).cloned()
    }

    /// Drop the in-memory path of a video. The file stays on disk.
    pub fn forget(&self, video_id: &str) -> Option<PathBuf> {
        self.state.lock().resolved.remove(video_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deterministic cache location of a video.
    pub fn local_path(&self, video_id: &str, reference: &str) -> PathBuf {
        let extension = Path::new(reference)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(DEFAULT_EXTENSION);
        self.config
            .cache_dir
            .join(format!("{}.{}", sanitize(video_id), extension))
    }

    /// Delete undersized files and leftover partial downloads.
    ///
    /// Meant to run once at session start, before players mount.
    pub async fn cleanup(&self) -> std::io::Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut dir = match tokio::fs::read_dir(&self.config.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        let mut removed_paths = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let metadata = item.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            report.scanned += 1;

            let path = item.path();
            let partial = path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_SUFFIX);
            if partial || metadata.len() < self.config.min_valid_file_size {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(path = ?path, size = metadata.len(), "removed corrupt cache file");
                        report.removed += 1;
                        report.bytes_freed += metadata.len();
                        removed_paths.push(path);
                    }
                    Err(e) => warn!(path = ?path, error = %e, "failed to remove cache file"),
                }
            }
        }

        if !removed_paths.is_empty() {
            self.state
                .lock()
                .resolved
                .retain(|_, path| !removed_paths.contains(path));
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            "video cache cleanup finished"
        );
        Ok(report)
    }
}

async fn fetch<S>(
    store: Arc<S>,
    video_id: String,
    reference: String,
    local_path: PathBuf,
) -> Result<PathBuf, ResolveError>
where
    S: BlobStorePort + ?Sized,
{
    let download_error = |message: String| ResolveError::Download {
        video_id: video_id.clone(),
        message,
    };

    if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
        debug!(video_id = %video_id, path = ?local_path, "video already on disk");
        return Ok(local_path);
    }

    let url = store
        .fetch_url(&reference)
        .await
        .map_err(|e| download_error(format!("no fetch url for {}: {}", reference, e)))?;

    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| download_error(e.to_string()))?;
    }

    let partial = partial_path(&local_path);
    info!(video_id = %video_id, url = %url, "downloading video");
    if let Err(e) = store.download_to_local(&url, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        warn!(video_id = %video_id, error = %e, "video download failed");
        return Err(download_error(e.to_string()));
    }

    tokio::fs::rename(&partial, &local_path)
        .await
        .map_err(|e| download_error(e.to_string()))?;
    Ok(local_path)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Cache file stem of an id.
///
/// Bytes outside `[A-Za-z0-9-]` become `_xx` hex escapes, `_` included, so
/// distinct ids never share a file and none escapes the cache directory.
fn sanitize(video_id: &str) -> String {
    let mut stem = String::with_capacity(video_id.len());
    for byte in video_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    stem
}
