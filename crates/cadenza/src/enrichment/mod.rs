//! Background artist enrichment.
//!
//! One worker per engine fills in artist biographies and images from remote
//! providers. Artists are picked up while their `metadata_checked_at` marker
//! is unset; the marker is stamped once the providers gave a conclusive
//! answer, found or not, so a later run never revisits them.

pub mod images;
pub mod providers;

use cadenza_core::{ServiceError, ServiceResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::catalog::{get_artists_needing_metadata, update_artist_metadata};
use crate::db::{ArtistRef, Database, DbError};
use crate::scanner::artwork::ArtworkCache;

use self::images::{ImageFetchError, ImageFetchMemoizer};
use self::providers::{BiographyProvider, ImageProvider};

/// Raised when an artist's stored biography or image changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistMetadataUpdated {
    pub artist_id: i64,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnrichmentSettings {
    pub batch_size: usize,
    /// Pause between artists
    pub request_delay: Duration,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            request_delay: Duration::from_millis(250),
        }
    }
}

/// Counters for one enrichment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub checked: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug)]
enum ArtistOutcome {
    /// Stamped; `Some` when a field changed
    Checked(Option<ArtistMetadataUpdated>),
    /// Inconclusive; retried on a later run
    Skipped,
}

#[derive(Debug, Default)]
struct LoopState {
    running: bool,
    generation: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

pub struct ArtistEnricher {
    db: Database,
    biographies: Arc<dyn BiographyProvider>,
    images: Arc<dyn ImageProvider>,
    memo: Arc<ImageFetchMemoizer>,
    artwork: ArtworkCache,
    settings: EnrichmentSettings,
    state: Mutex<LoopState>,
    events: broadcast::Sender<ArtistMetadataUpdated>,
}

impl std::fmt::Debug for ArtistEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtistEnricher")
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ArtistEnricher {
    pub fn new(
        db: Database,
        biographies: Arc<dyn BiographyProvider>,
        images: Arc<dyn ImageProvider>,
        memo: Arc<ImageFetchMemoizer>,
        artwork: ArtworkCache,
        settings: EnrichmentSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            db,
            biographies,
            images,
            memo,
            artwork,
            settings,
            state: Mutex::new(LoopState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArtistMetadataUpdated> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn memoizer(&self) -> &Arc<ImageFetchMemoizer> {
        &self.memo
    }

    /// Spawn the worker. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state.running {
            debug!("Enrichment already running");
            return false;
        }
        if state.cancel.is_cancelled() {
            state.cancel = CancellationToken::new();
        }

        state.running = true;
        state.generation += 1;
        let generation = state.generation;
        let cancel = state.cancel.clone();
        let this = Arc::clone(self);

        state.handle = Some(tokio::spawn(async move {
            let stats = this.run(&cancel).await;
            info!(
                checked = stats.checked,
                updated = stats.updated,
                skipped = stats.skipped,
                cancelled = cancel.is_cancelled(),
                "Artist enrichment finished"
            );
            let mut state = this.state.lock();
            if state.generation == generation {
                state.running = false;
                state.handle = None;
            }
        }));
        true
    }

    /// Cancel the worker and wait up to `grace` for it to exit
    pub async fn stop(&self, grace: Duration) {
        let handle = {
            let mut state = self.state.lock();
            state.cancel.cancel();
            state.running = false;
            state.handle.take()
        };

        let Some(handle) = handle else {
            return;
        };
        if tokio::time::timeout(grace, handle).await.is_err() {
            warn!(?grace, "Enrichment worker did not stop within grace period");
        }
    }

    async fn run(&self, cancel: &CancellationToken) -> EnrichmentStats {
        let mut stats = EnrichmentStats::default();
        let mut skipped: HashSet<i64> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                return stats;
            }

            let exclude = skipped.clone();
            let limit = self.settings.batch_size.max(1);
            let batch = match self
                .db
                .call(move |conn| get_artists_needing_metadata(conn, limit, &exclude))
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Failed to load artists needing metadata");
                    return stats;
                }
            };
            if batch.is_empty() {
                return stats;
            }

            for artist in batch {
                if cancel.is_cancelled() {
                    return stats;
                }

                match self.enrich_artist(&artist).await {
                    Ok(ArtistOutcome::Checked(event)) => {
                        stats.checked += 1;
                        if let Some(event) = event {
                            stats.updated += 1;
                            let _ = self.events.send(event);
                        }
                    }
                    Ok(ArtistOutcome::Skipped) => {
                        stats.skipped += 1;
                        skipped.insert(artist.id);
                    }
                    Err(e) if e.is_write_conflict() => {
                        warn!(artist = %artist.name, error = %e, "Artist changed concurrently, skipping");
                        stats.skipped += 1;
                        skipped.insert(artist.id);
                    }
                    Err(e) => {
                        error!(artist = %artist.name, error = %e, "Enrichment stopped on database error");
                        return stats;
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => return stats,
                    _ = tokio::time::sleep(self.settings.request_delay) => {}
                }
            }
        }
    }

    async fn enrich_artist(&self, artist: &ArtistRef) -> Result<ArtistOutcome, DbError> {
        let (biography, image_url) = tokio::join!(
            self.biographies.fetch_biography(&artist.name),
            self.images.fetch_image_url(&artist.name),
        );

        if biography.is_inconclusive() || image_url.is_inconclusive() {
            debug!(artist = %artist.name, "Provider answer inconclusive, retrying later");
            return Ok(ArtistOutcome::Skipped);
        }

        let biography = found(biography, &artist.name);
        let image_path = match found(image_url, &artist.name) {
            Some(url) => {
                let key = format!("artist:{}", artist.id);
                let target = self.artwork.artist_image_path(artist.id);
                match self.memo.fetch(&key, &url, target).await {
                    Ok(path) => Some(path.to_string_lossy().into_owned()),
                    Err(ImageFetchError::Http(status)) if status != 429 && status < 500 => {
                        debug!(artist = %artist.name, status, "Image unavailable");
                        None
                    }
                    Err(e) => {
                        warn!(artist = %artist.name, error = %e, "Image download failed, retrying later");
                        return Ok(ArtistOutcome::Skipped);
                    }
                }
            }
            None => None,
        };

        let artist_id = artist.id;
        let checked_at = chrono::Utc::now().timestamp();
        let (bio, image) = (biography.clone(), image_path.clone());
        let stamped = self
            .db
            .call(move |conn| {
                update_artist_metadata(conn, artist_id, bio.as_deref(), image.as_deref(), checked_at)
            })
            .await?;

        if !stamped {
            debug!(artist = %artist.name, "Artist removed before enrichment finished");
            return Ok(ArtistOutcome::Skipped);
        }

        let changed = biography.is_some() || image_path.is_some();
        Ok(ArtistOutcome::Checked(changed.then(|| ArtistMetadataUpdated {
            artist_id,
            image_path,
        })))
    }
}

/// Value of a conclusive provider answer; permanent errors count as "nothing found"
fn found<T>(result: ServiceResult<T>, artist: &str) -> Option<T> {
    match result.into_result() {
        Ok(value) => value,
        Err(ServiceError::Permanent(message)) => {
            warn!(artist, error = %message, "Provider cannot serve artist");
            None
        }
        Err(ServiceError::Temporary(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::get_artist_by_name;
    use crate::enrichment::providers::ImageDownloader;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeBiographies {
        answers: HashMap<&'static str, ServiceResult<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BiographyProvider for FakeBiographies {
        async fn fetch_biography(&self, artist_name: &str) -> ServiceResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(artist_name)
                .cloned()
                .unwrap_or(ServiceResult::NotFound)
        }
    }

    struct FakeImages;

    #[async_trait]
    impl ImageProvider for FakeImages {
        async fn fetch_image_url(&self, artist_name: &str) -> ServiceResult<String> {
            match artist_name {
                "Pictured" => ServiceResult::Found("http://img/pictured".into()),
                _ => ServiceResult::NotFound,
            }
        }
    }

    struct FakeDownloader;

    #[async_trait]
    impl ImageDownloader for FakeDownloader {
        async fn download(&self, _url: &str) -> Result<Vec<u8>, ImageFetchError> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
    }

    fn setup(
        names: &[&str],
        biographies: FakeBiographies,
    ) -> (Arc<ArtistEnricher>, Database, tempfile::TempDir) {
        let db = Database::new_in_memory().unwrap();
        db.with_conn(|conn| {
            for name in names {
                conn.execute("INSERT INTO artists (name) VALUES (?)", [name])?;
            }
            Ok(())
        })
        .unwrap();
        let dir = tempdir().unwrap();
        let enricher = Arc::new(ArtistEnricher::new(
            db.clone(),
            Arc::new(biographies),
            Arc::new(FakeImages),
            Arc::new(ImageFetchMemoizer::new(Arc::new(FakeDownloader))),
            ArtworkCache::new(dir.path()),
            EnrichmentSettings {
                batch_size: 2,
                request_delay: Duration::from_millis(1),
            },
        ));
        (enricher, db, dir)
    }

    fn checked_at(db: &Database, name: &str) -> Option<i64> {
        db.with_conn(|conn| get_artist_by_name(conn, name))
            .unwrap()
            .unwrap()
            .metadata_checked_at
    }

    #[tokio::test]
    async fn test_run_stamps_conclusive_and_skips_inconclusive() {
        let biographies = FakeBiographies {
            answers: HashMap::from([
                ("Known", ServiceResult::Found("A known band.".to_string())),
                ("Flaky", ServiceResult::TemporaryError("rate limited".to_string())),
                ("Banned", ServiceResult::PermanentError("suspended".to_string())),
            ]),
            ..Default::default()
        };
        let (enricher, db, _dir) = setup(&["Known", "Flaky", "Banned", "Pictured", "Nobody"], biographies);
        let mut events = enricher.subscribe();

        let stats = enricher.run(&CancellationToken::new()).await;

        assert_eq!(stats.checked, 4);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.updated, 2);
        assert!(checked_at(&db, "Known").is_some());
        assert!(checked_at(&db, "Banned").is_some());
        assert!(checked_at(&db, "Nobody").is_some());
        assert!(checked_at(&db, "Flaky").is_none());

        let known = db
            .with_conn(|conn| get_artist_by_name(conn, "Known"))
            .unwrap()
            .unwrap();
        assert_eq!(known.biography.as_deref(), Some("A known band."));

        let pictured = db
            .with_conn(|conn| get_artist_by_name(conn, "Pictured"))
            .unwrap()
            .unwrap();
        let image = pictured.image_path.clone().unwrap();
        assert!(std::path::Path::new(&image).exists());

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 2);
        assert!(received.contains(&ArtistMetadataUpdated {
            artist_id: pictured.id,
            image_path: Some(image),
        }));
    }

    #[tokio::test]
    async fn test_checked_artists_are_never_revisited() {
        let (enricher, _db, _dir) = setup(&["One", "Two"], FakeBiographies::default());

        enricher.run(&CancellationToken::new()).await;
        let second = enricher.run(&CancellationToken::new()).await;

        assert_eq!(second, EnrichmentStats::default());
    }

    #[tokio::test]
    async fn test_start_is_noop_while_running_and_restartable_after_stop() {
        let (enricher, _db, _dir) = setup(&["One"], FakeBiographies::default());

        assert!(enricher.start());
        assert!(!enricher.start());
        enricher.stop(Duration::from_millis(500)).await;
        assert!(!enricher.is_running());

        assert!(enricher.start());
        enricher.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_cancelled_run_does_no_work() {
        let biographies = FakeBiographies::default();
        let (enricher, db, _dir) = setup(&["One"], biographies);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = enricher.run(&cancel).await;

        assert_eq!(stats, EnrichmentStats::default());
        assert!(checked_at(&db, "One").is_none());
    }
}
