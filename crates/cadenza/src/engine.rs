//! Library engine: folder scans, folder removal and the enrichment lifecycle.
//!
//! A scan is diff -> extract -> upsert -> reap, in that order, for a single
//! folder. Scans of the same folder are serialized by a per-folder lock;
//! different folders may scan concurrently unless driven through
//! [`LibraryEngine::refresh_all_folders`], which goes one folder at a time.

use cadenza_core::{ScanOutcome, ScanProgress, ScanStatus, path_key};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::EngineConfig;
use crate::db::catalog::{
    clear_catalog, delete_folder, get_all_folders, get_folder_by_id, get_folder_fingerprints,
    get_library_stats, get_or_create_folder, mark_folder_scanned,
};
use crate::db::orphans::{reap_orphans, unreferenced_cache_files};
use crate::db::upsert::{SongBatch, commit_batch};
use crate::db::{Database, Folder, LibraryStats};
use crate::enrichment::images::ImageFetchMemoizer;
use crate::enrichment::providers::{BiographyProvider, HttpImageDownloader, ImageDownloader, ImageProvider};
use crate::enrichment::{ArtistEnricher, ArtistMetadataUpdated};
use crate::lastfm::LastFmClient;
use crate::scanner::artwork::ArtworkCache;
use crate::scanner::extract::extract_all;
use crate::scanner::fs::{FileSystem, LocalFileSystem};
use crate::scanner::inventory::run_inventory;
use crate::scanner::metadata::{LoftyExtractor, MetadataExtractor};
use crate::scanner::{ProgressSink, ScanError, ScanResult};
use crate::theaudiodb::TheAudioDbClient;

/// External collaborators the engine drives
pub struct Collaborators {
    pub fs: Arc<dyn FileSystem>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub biographies: Arc<dyn BiographyProvider>,
    pub images: Arc<dyn ImageProvider>,
    pub downloader: Arc<dyn ImageDownloader>,
}

impl Default for Collaborators {
    /// Local filesystem, lofty, Last.fm biographies and TheAudioDB images
    fn default() -> Self {
        Self {
            fs: Arc::new(LocalFileSystem),
            extractor: Arc::new(LoftyExtractor),
            biographies: Arc::new(LastFmClient::new()),
            images: Arc::new(TheAudioDbClient::new()),
            downloader: Arc::new(HttpImageDownloader::default()),
        }
    }
}

/// Result of [`LibraryEngine::refresh_all_folders`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub scanned: usize,
    /// Folders whose scan changed the catalog
    pub changed: usize,
    /// Folders skipped because their root no longer exists
    pub missing: Vec<String>,
    /// Folders whose scan failed, with the error
    pub failed: Vec<(i64, String)>,
    pub cancelled: bool,
}

pub struct LibraryEngine {
    db: Database,
    fs: Arc<dyn FileSystem>,
    extractor: Arc<dyn MetadataExtractor>,
    artwork: ArtworkCache,
    config: EngineConfig,
    folder_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    enricher: Arc<ArtistEnricher>,
}

impl std::fmt::Debug for LibraryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryEngine")
            .field("db", &self.db)
            .field("config", &self.config)
            .field("enricher", &self.enricher)
            .finish()
    }
}

impl LibraryEngine {
    /// Engine over the real filesystem and remote providers
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self::with_collaborators(db, config, Collaborators::default())
    }

    pub fn with_collaborators(db: Database, config: EngineConfig, parts: Collaborators) -> Self {
        let artwork = ArtworkCache::new(&config.cache_dir);
        let enricher = Arc::new(ArtistEnricher::new(
            db.clone(),
            parts.biographies,
            parts.images,
            Arc::new(ImageFetchMemoizer::new(parts.downloader)),
            artwork.clone(),
            config.enrichment_settings(),
        ));

        Self {
            db,
            fs: parts.fs,
            extractor: parts.extractor,
            artwork,
            config,
            folder_locks: Mutex::new(HashMap::new()),
            enricher,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register `path` as a library folder (if new) and scan it
    pub async fn scan_folder(
        &self,
        path: &str,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ScanResult<ScanOutcome> {
        if !self.fs.exists(Path::new(path)) {
            return Err(ScanError::PathNotFound(path.to_string()));
        }

        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let folder_path = path.to_string();
        let folder = self
            .db
            .call(move |conn| get_or_create_folder(conn, &folder_path, &name))
            .await?;

        self.run_scan(folder, progress, cancel).await
    }

    /// Rescan a registered folder; returns whether the catalog changed
    pub async fn rescan_folder(
        &self,
        folder_id: i64,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ScanResult<bool> {
        let folder = self.load_folder(folder_id).await?;
        if !self.fs.exists(Path::new(&folder.path)) {
            return Err(ScanError::PathNotFound(folder.path));
        }

        let outcome = self.run_scan(folder, progress, cancel).await?;
        Ok(outcome.changed())
    }

    /// Rescan every registered folder, strictly one at a time
    pub async fn refresh_all_folders(
        &self,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ScanResult<RefreshSummary> {
        let folders = self.db.call(get_all_folders).await?;
        let mut summary = RefreshSummary::default();

        for folder in folders {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if !self.fs.exists(Path::new(&folder.path)) {
                warn!(folder = %folder.path, "Library folder is missing, skipping");
                summary.missing.push(folder.path);
                continue;
            }

            let folder_id = folder.id;
            match self.run_scan(folder, progress.clone(), cancel).await {
                Ok(outcome) if outcome.status == ScanStatus::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
                Ok(outcome) => {
                    summary.scanned += 1;
                    if outcome.changed() {
                        summary.changed += 1;
                    }
                }
                Err(e) => {
                    error!(folder_id, error = %e, "Folder refresh failed");
                    summary.failed.push((folder_id, e.to_string()));
                }
            }
        }

        info!(
            scanned = summary.scanned,
            changed = summary.changed,
            missing = summary.missing.len(),
            failed = summary.failed.len(),
            "Library refresh finished"
        );
        Ok(summary)
    }

    /// Remove a folder, its songs and everything they alone referenced
    pub async fn remove_folder(&self, folder_id: i64) -> ScanResult<bool> {
        let lock = self.folder_lock(folder_id);
        let _guard = lock.lock().await;

        let artwork = self.artwork.clone();
        let (deleted, stale) = self
            .db
            .call_tx(move |conn| {
                let (deleted, mut released) = delete_folder(conn, folder_id)?;
                if !deleted {
                    return Ok((false, Vec::new()));
                }
                let reaped = reap_orphans(conn)?;
                released.extend(reaped.released_files);
                let stale = unreferenced_cache_files(conn, &released, &artwork)?;
                Ok((true, stale))
            })
            .await?;

        if deleted {
            info!(folder_id, "Removed library folder");
            self.remove_side_files(stale).await;
        }
        self.folder_locks.lock().remove(&folder_id);
        Ok(deleted)
    }

    /// Start the enrichment worker; `false` if it is already running
    pub fn start_background_enrichment(&self) -> bool {
        self.enricher.start()
    }

    pub async fn stop_background_enrichment(&self) {
        self.enricher.stop(self.config.enrichment_stop_grace()).await;
    }

    pub fn is_enrichment_running(&self) -> bool {
        self.enricher.is_running()
    }

    pub fn subscribe_artist_updates(&self) -> broadcast::Receiver<ArtistMetadataUpdated> {
        self.enricher.subscribe()
    }

    /// Wipe the catalog and the side-file cache
    pub async fn reset_library(&self) -> ScanResult<()> {
        self.stop_background_enrichment().await;

        self.db.call_tx(clear_catalog).await?;
        self.enricher.memoizer().clear();
        self.folder_locks.lock().clear();

        let cache_dir = self.artwork.root().to_path_buf();
        if let Err(e) = tokio::fs::remove_dir_all(&cache_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %cache_dir.display(), error = %e, "Failed to clear cache directory");
            }
        }

        info!("Library reset");
        Ok(())
    }

    pub async fn stats(&self) -> ScanResult<LibraryStats> {
        Ok(self.db.call(get_library_stats).await?)
    }

    async fn load_folder(&self, folder_id: i64) -> ScanResult<Folder> {
        self.db
            .call(move |conn| get_folder_by_id(conn, folder_id))
            .await?
            .ok_or(ScanError::FolderNotFound(folder_id))
    }

    fn folder_lock(&self, folder_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.folder_locks.lock().entry(folder_id).or_default())
    }

    async fn run_scan(
        &self,
        folder: Folder,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ScanResult<ScanOutcome> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("scan", job_id = %job_id, folder_id = folder.id);
        self.scan_phases(job_id, folder, progress, cancel)
            .instrument(span)
            .await
    }

    async fn scan_phases(
        &self,
        job_id: String,
        folder: Folder,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ScanResult<ScanOutcome> {
        let lock = self.folder_lock(folder.id);
        let _guard = lock.lock().await;

        let mut outcome = ScanOutcome {
            job_id,
            folder_id: folder.id,
            status: ScanStatus::Cancelled,
            message: "Scan cancelled.".to_string(),
            added: 0,
            updated: 0,
            removed: 0,
            failed: 0,
        };
        let report = |p: ScanProgress| {
            if let Some(sink) = &progress {
                sink(p);
            }
        };

        // Phase 1: inventory
        if cancel.is_cancelled() {
            return Ok(outcome);
        }
        report(ScanProgress::indeterminate(format!("Scanning {}", folder.path)));

        let folder_id = folder.id;
        let catalog = self
            .db
            .call(move |conn| get_folder_fingerprints(conn, folder_id))
            .await?;
        let fs = Arc::clone(&self.fs);
        let root = PathBuf::from(&folder.path);
        let recursive = self.config.recursive;
        let inventory =
            tokio::task::spawn_blocking(move || run_inventory(fs.as_ref(), &catalog, &root, recursive))
                .await
                .map_err(|e| ScanError::Task(e.to_string()))??;
        let diff = &inventory.diff;

        debug!(
            to_add = diff.to_add.len(),
            to_update = diff.to_update.len(),
            to_delete = diff.to_delete.len(),
            skipped = inventory.skipped,
            "Inventory complete"
        );

        if diff.is_empty() {
            self.db
                .call(move |conn| mark_folder_scanned(conn, folder_id, None))
                .await?;
            outcome.status = ScanStatus::NoChanges;
            outcome.message = "No new songs found.".to_string();
            report(ScanProgress {
                status: outcome.message.clone(),
                percent: Some(100),
                current_path: None,
                total_files: 0,
                new_items: 0,
            });
            info!("No changes");
            return Ok(outcome);
        }

        // Phase 2: extraction
        if cancel.is_cancelled() {
            return Ok(outcome);
        }
        let items: Vec<(String, i64)> = diff
            .to_extract()
            .filter_map(|path| inventory.mtime_of(path).map(|mtime| (path.clone(), mtime)))
            .collect();
        let extraction = extract_all(
            Arc::clone(&self.extractor),
            items,
            self.config.extraction_parallelism,
            self.config.progress_cadence,
            cancel,
            progress.clone(),
        )
        .await;
        if extraction.cancelled || cancel.is_cancelled() {
            info!("Scan cancelled during extraction");
            return Ok(outcome);
        }

        // Updated files that failed to re-extract keep their current row
        let failed_keys: HashSet<String> = extraction.failed.iter().map(|p| path_key(p)).collect();
        let delete_paths: Vec<String> = diff
            .to_delete
            .iter()
            .filter(|p| !failed_keys.contains(&path_key(p)))
            .cloned()
            .collect();
        let new_keys: HashSet<String> = diff.to_add.iter().map(|p| path_key(p)).collect();
        let added = extraction
            .records
            .iter()
            .filter(|r| new_keys.contains(&path_key(&r.path)))
            .count();
        outcome.added = added;
        outcome.updated = extraction.records.len() - added;
        outcome.removed = diff.removed().count();
        outcome.failed = extraction.failed.len();

        // Phase 3: upsert
        report(ScanProgress {
            status: "Saving changes".to_string(),
            percent: None,
            current_path: None,
            total_files: extraction.records.len(),
            new_items: added,
        });
        let batch = Arc::new(SongBatch {
            folder_id,
            delete_paths,
            records: extraction.records,
        });
        let committed = commit_batch(&self.db, batch, &self.artwork, &self.config.write_retry)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to save scan results");
                e
            })?;

        // Phase 4: orphan sweep
        let artwork = self.artwork.clone();
        let released = committed.released_files;
        let stale = self
            .db
            .call_tx(move |conn| {
                let reaped = reap_orphans(conn)?;
                if reaped.total() > 0 {
                    debug!(
                        albums = reaped.albums,
                        artists = reaped.artists,
                        genres = reaped.genres,
                        "Reaped orphans"
                    );
                }
                let mut candidates = released;
                candidates.extend(reaped.released_files);
                mark_folder_scanned(conn, folder_id, None)?;
                unreferenced_cache_files(conn, &candidates, &artwork)
            })
            .await?;
        self.remove_side_files(stale).await;

        outcome.status = ScanStatus::Completed;
        outcome.message = format!(
            "Added {}, updated {}, removed {} songs.",
            outcome.added, outcome.updated, outcome.removed
        );
        if outcome.failed > 0 {
            outcome.message.push_str(&format!(" {} files could not be read.", outcome.failed));
        }
        report(ScanProgress {
            status: outcome.message.clone(),
            percent: Some(100),
            current_path: None,
            total_files: outcome.added + outcome.updated,
            new_items: outcome.added,
        });
        info!(
            added = outcome.added,
            updated = outcome.updated,
            removed = outcome.removed,
            failed = outcome.failed,
            "Scan complete"
        );
        Ok(outcome)
    }

    /// Delete cache files best-effort; failures are logged only
    async fn remove_side_files(&self, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            return;
        }
        let fs = Arc::clone(&self.fs);
        let result = tokio::task::spawn_blocking(move || {
            for path in paths {
                if let Err(e) = fs.remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %e, "Failed to remove cached file");
                    }
                }
            }
        })
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Cache cleanup task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::providers::Unconfigured;
    use cadenza_core::ExtractedMetadata;
    use std::fs::File;
    use tempfile::tempdir;

    struct StemExtractor;

    impl MetadataExtractor for StemExtractor {
        fn extract(&self, path: &Path) -> ExtractedMetadata {
            ExtractedMetadata {
                path: path.to_string_lossy().into_owned(),
                artist: Some("Stem Artist".into()),
                ..Default::default()
            }
        }
    }

    fn engine(cache: &Path) -> LibraryEngine {
        let config = EngineConfig {
            cache_dir: cache.to_path_buf(),
            extraction_parallelism: 2,
            ..Default::default()
        };
        LibraryEngine::with_collaborators(
            Database::new_in_memory().unwrap(),
            config,
            Collaborators {
                fs: Arc::new(LocalFileSystem),
                extractor: Arc::new(StemExtractor),
                biographies: Arc::new(Unconfigured),
                images: Arc::new(Unconfigured),
                downloader: Arc::new(HttpImageDownloader::default()),
            },
        )
    }

    #[tokio::test]
    async fn test_scan_missing_path() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir.path().join("cache"));

        let missing = dir.path().join("nope");
        let result = engine
            .scan_folder(missing.to_str().unwrap(), None, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_rescan_unknown_folder() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir.path().join("cache"));

        let result = engine.rescan_folder(42, None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ScanError::FolderNotFound(42))));
    }

    #[tokio::test]
    async fn test_refresh_skips_missing_folder() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir(&music).unwrap();
        File::create(music.join("a.mp3")).unwrap();
        let engine = engine(&dir.path().join("cache"));
        engine
            .database()
            .with_conn(|conn| get_or_create_folder(conn, "/definitely/not/here", "here"))
            .unwrap();
        engine
            .scan_folder(music.to_str().unwrap(), None, &CancellationToken::new())
            .await
            .unwrap();

        let summary = engine
            .refresh_all_folders(None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.missing, vec!["/definitely/not/here".to_string()]);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_reset_library_clears_everything() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir(&music).unwrap();
        File::create(music.join("a.mp3")).unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(cache.join("art")).unwrap();
        let engine = engine(&cache);
        engine
            .scan_folder(music.to_str().unwrap(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(engine.start_background_enrichment());

        engine.reset_library().await.unwrap();

        assert_eq!(engine.stats().await.unwrap(), LibraryStats::default());
        assert!(!engine.is_enrichment_running());
        assert!(!cache.exists());
    }
}
