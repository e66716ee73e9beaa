//! Single-flight image downloads keyed by cache key.
//!
//! Concurrent requests for the same key share one download. An entry lives
//! only while its download is in flight: once it resolves it is evicted, so
//! a failure is retried by the next request and a success is served from the
//! file on disk. Eviction only removes the exact future that resolved.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::enrichment::providers::ImageDownloader;
use crate::scanner::artwork::write_if_absent;

/// Image download failure, cloneable so every waiter gets a copy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageFetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

type SharedFetch = Shared<BoxFuture<'static, Result<PathBuf, ImageFetchError>>>;

pub struct ImageFetchMemoizer {
    downloader: Arc<dyn ImageDownloader>,
    inflight: Mutex<HashMap<String, SharedFetch>>,
}

impl std::fmt::Debug for ImageFetchMemoizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFetchMemoizer")
            .field("entries", &self.inflight.lock().len())
            .finish()
    }
}

impl ImageFetchMemoizer {
    pub fn new(downloader: Arc<dyn ImageDownloader>) -> Self {
        Self {
            downloader,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Download `url` to `target` once per `key`
    pub async fn fetch(
        &self,
        key: &str,
        url: &str,
        target: PathBuf,
    ) -> Result<PathBuf, ImageFetchError> {
        let fetch = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(key.to_string())
                .or_insert_with(|| {
                    download_to(Arc::clone(&self.downloader), url.to_string(), target)
                        .boxed()
                        .shared()
                })
                .clone()
        };

        let result = fetch.clone().await;

        let mut inflight = self.inflight.lock();
        if inflight.get(key).is_some_and(|current| current.ptr_eq(&fetch)) {
            if let Err(e) = &result {
                debug!(key, error = %e, "Evicting failed image fetch");
            }
            inflight.remove(key);
        }

        result
    }

    /// Forget every in-flight entry
    pub fn clear(&self) {
        self.inflight.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn download_to(
    downloader: Arc<dyn ImageDownloader>,
    url: String,
    target: PathBuf,
) -> Result<PathBuf, ImageFetchError> {
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return Ok(target);
    }

    let bytes = downloader.download(&url).await?;

    tokio::task::spawn_blocking(move || {
        write_if_absent(&target, &bytes)
            .map(|_| target)
            .map_err(|e| ImageFetchError::Io(e.to_string()))
    })
    .await
    .map_err(|e| ImageFetchError::Task(e.to_string()))?
}
