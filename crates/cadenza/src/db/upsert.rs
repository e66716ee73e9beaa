//! Batch upsert of extracted metadata into the catalog.
//!
//! One attempt runs in a single transaction: it removes the songs being
//! replaced, resolves (or creates) every artist, album and genre the batch
//! references through in-memory lookup tables, and inserts the new song
//! rows. A write conflict discards the attempt and the whole batch is
//! retried against a fresh read of the catalog.

use cadenza_core::ExtractedMetadata;
use rusqlite::{Connection, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::catalog::{MAX_PARAMS_PER_STATEMENT, delete_songs_by_paths};
use crate::db::schema::name_key;
use crate::db::{Database, DbResult};
use crate::scanner::artwork::{ArtworkCache, find_folder_artwork};

/// Retry bounds for conflicting writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `base_backoff_ms * n`
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or the
/// policy's attempts are exhausted. `op` receives the 1-based attempt number.
pub async fn with_write_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> DbResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_write_conflict() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(attempt, max_attempts, error = %e, ?delay, "Write conflict, retrying batch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Songs to replace and insert for one folder
#[derive(Debug, Clone, Default)]
pub struct SongBatch {
    pub folder_id: i64,
    /// Catalog paths to delete before inserting (removed + updated files)
    pub delete_paths: Vec<String>,
    pub records: Vec<ExtractedMetadata>,
}

/// What a committed batch changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub songs_added: usize,
    pub songs_removed: usize,
    pub artists_created: usize,
    pub albums_created: usize,
    pub genres_created: usize,
    /// Side-files referenced by the removed songs
    pub released_files: Vec<String>,
}

/// Commit a batch with conflict retries
pub async fn commit_batch(
    db: &Database,
    batch: Arc<SongBatch>,
    artwork: &ArtworkCache,
    policy: &RetryPolicy,
) -> DbResult<BatchResult> {
    with_write_retry(policy, |attempt| {
        let db = db.clone();
        let batch = Arc::clone(&batch);
        let artwork = artwork.clone();
        async move {
            debug!(
                attempt,
                folder_id = batch.folder_id,
                records = batch.records.len(),
                "Committing song batch"
            );
            db.call_tx(move |conn| apply_batch(conn, &batch, &artwork))
                .await
        }
    })
    .await
}

#[derive(Debug)]
struct AlbumSlot {
    id: i64,
    year: Option<i32>,
    cover: Option<String>,
}

/// Per-attempt identity map from normalized names to row ids
#[derive(Debug, Default)]
struct LookupTables {
    artists: HashMap<String, i64>,
    albums: HashMap<(String, i64), AlbumSlot>,
    genres: HashMap<String, i64>,
    artists_created: usize,
    albums_created: usize,
    genres_created: usize,
}

impl LookupTables {
    /// Bulk-load the rows a batch references
    fn preload(conn: &Connection, records: &[&ExtractedMetadata]) -> DbResult<Self> {
        let mut artist_names = BTreeSet::new();
        let mut album_titles = BTreeSet::new();
        let mut genre_names = BTreeSet::new();

        for record in records {
            artist_names.insert(record.track_artist().trim().to_string());
            artist_names.insert(record.effective_album_artist().trim().to_string());
            if let Some(title) = record.album_title() {
                album_titles.insert(title.to_string());
            }
            for genre in &record.genres {
                let genre = genre.trim();
                if !genre.is_empty() {
                    genre_names.insert(genre.to_string());
                }
            }
        }

        let mut tables = LookupTables::default();

        for_each_chunk(conn, "SELECT id, name FROM artists WHERE name IN", &artist_names, |row| {
            let (id, name): (i64, String) = (row.get(0)?, row.get(1)?);
            tables.artists.insert(name_key(&name), id);
            Ok(())
        })?;

        for_each_chunk(
            conn,
            "SELECT id, title, artist_id, year, cover_art_path FROM albums WHERE title IN",
            &album_titles,
            |row| {
                let title: String = row.get(1)?;
                let slot = AlbumSlot {
                    id: row.get(0)?,
                    year: row.get(3)?,
                    cover: row.get(4)?,
                };
                tables.albums.insert((name_key(&title), row.get(2)?), slot);
                Ok(())
            },
        )?;

        for_each_chunk(conn, "SELECT id, name FROM genres WHERE name IN", &genre_names, |row| {
            let (id, name): (i64, String) = (row.get(0)?, row.get(1)?);
            tables.genres.insert(name_key(&name), id);
            Ok(())
        })?;

        Ok(tables)
    }

    fn artist_id(&mut self, conn: &Connection, name: &str) -> DbResult<i64> {
        let key = name_key(name);
        if let Some(id) = self.artists.get(&key) {
            return Ok(*id);
        }
        let inserted = conn.execute(
            "INSERT INTO artists (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            [name.trim()],
        )?;
        let id: i64 =
            conn.query_row("SELECT id FROM artists WHERE name = ?", [name.trim()], |r| r.get(0))?;
        self.artists_created += inserted;
        self.artists.insert(key, id);
        Ok(id)
    }

    fn album(&mut self, conn: &Connection, title: &str, artist_id: i64) -> DbResult<&mut AlbumSlot> {
        match self.albums.entry((name_key(title), artist_id)) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(vacant) => {
                let inserted = conn.execute(
                    "INSERT INTO albums (title, artist_id) VALUES (?, ?)
                     ON CONFLICT(title, artist_id) DO NOTHING",
                    params![title.trim(), artist_id],
                )?;
                let slot = conn.query_row(
                    "SELECT id, year, cover_art_path FROM albums WHERE title = ? AND artist_id = ?",
                    params![title.trim(), artist_id],
                    |r| {
                        Ok(AlbumSlot {
                            id: r.get(0)?,
                            year: r.get(1)?,
                            cover: r.get(2)?,
                        })
                    },
                )?;
                self.albums_created += inserted;
                Ok(vacant.insert(slot))
            }
        }
    }

    fn genre_id(&mut self, conn: &Connection, name: &str) -> DbResult<i64> {
        let key = name_key(name);
        if let Some(id) = self.genres.get(&key) {
            return Ok(*id);
        }
        let inserted = conn.execute(
            "INSERT INTO genres (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            [name.trim()],
        )?;
        let id: i64 =
            conn.query_row("SELECT id FROM genres WHERE name = ?", [name.trim()], |r| r.get(0))?;
        self.genres_created += inserted;
        self.genres.insert(key, id);
        Ok(id)
    }
}

/// Run `sql (?, ?, ...)` over `values` in parameter-limit sized chunks
fn for_each_chunk<F>(
    conn: &Connection,
    sql_prefix: &str,
    values: &BTreeSet<String>,
    mut f: F,
) -> DbResult<()>
where
    F: FnMut(&rusqlite::Row) -> DbResult<()>,
{
    let values: Vec<&String> = values.iter().collect();
    for chunk in values.chunks(MAX_PARAMS_PER_STATEMENT) {
        let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let mut stmt = conn.prepare(&format!("{} ({})", sql_prefix, placeholders))?;
        let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            f(row)?;
        }
    }
    Ok(())
}

/// One attempt: delete replaced songs, then insert the batch
pub fn apply_batch(
    conn: &Connection,
    batch: &SongBatch,
    artwork: &ArtworkCache,
) -> DbResult<BatchResult> {
    let removed = delete_songs_by_paths(conn, &batch.delete_paths)?;

    let records: Vec<&ExtractedMetadata> =
        batch.records.iter().filter(|r| !r.extraction_failed).collect();
    let mut lookup = LookupTables::preload(conn, &records)?;

    let mut folder_art: HashMap<PathBuf, Option<PathBuf>> = HashMap::new();
    let mut insert_song = conn.prepare(
        "INSERT INTO songs
         (path, folder_id, artist_id, album_id, title, duration, track_number, disc_number,
          year, bitrate, sample_rate, channels, file_size, file_mtime_ns, art_path, lyrics_path)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    let mut link_genre =
        conn.prepare("INSERT OR IGNORE INTO song_genres (song_id, genre_id) VALUES (?, ?)")?;

    let mut songs_added = 0;
    for record in records {
        let artist_id = lookup.artist_id(conn, record.track_artist())?;
        let album_artist_id = lookup.artist_id(conn, record.effective_album_artist())?;

        let art_path = record.embedded_art.as_deref().and_then(|bytes| {
            artwork
                .store_embedded_art(bytes)
                .map_err(|e| warn!(path = %record.path, error = %e, "Failed to cache embedded art"))
                .ok()
        });
        let lyrics_path = record.embedded_lyrics.as_deref().and_then(|text| {
            artwork
                .store_lyrics(text)
                .map_err(|e| warn!(path = %record.path, error = %e, "Failed to cache lyrics"))
                .ok()
        });
        let art_path = art_path.map(|p| p.to_string_lossy().into_owned());

        let album_id = match record.album_title() {
            Some(title) => {
                let slot = lookup.album(conn, title, album_artist_id)?;
                if slot.year.is_none() && record.year.is_some() {
                    conn.execute(
                        "UPDATE albums SET year = ? WHERE id = ? AND year IS NULL",
                        params![record.year, slot.id],
                    )?;
                    slot.year = record.year;
                }
                if slot.cover.is_none() {
                    let cover = art_path.clone().or_else(|| {
                        let dir = Path::new(&record.path).parent()?.to_path_buf();
                        folder_art
                            .entry(dir.clone())
                            .or_insert_with(|| find_folder_artwork(&dir))
                            .as_ref()
                            .map(|p| p.to_string_lossy().into_owned())
                    });
                    if let Some(cover) = cover {
                        conn.execute(
                            "UPDATE albums SET cover_art_path = ? WHERE id = ? AND cover_art_path IS NULL",
                            params![cover, slot.id],
                        )?;
                        slot.cover = Some(cover);
                    }
                }
                Some(slot.id)
            }
            None => None,
        };

        insert_song.execute(params![
            record.path,
            batch.folder_id,
            artist_id,
            album_id,
            song_title(record),
            record.duration,
            record.track_number,
            record.disc_number,
            record.year,
            record.bitrate,
            record.sample_rate,
            record.channels,
            record.file_size,
            record.file_mtime_ns,
            art_path,
            lyrics_path.map(|p| p.to_string_lossy().into_owned()),
        ])?;
        let song_id = conn.last_insert_rowid();
        songs_added += 1;

        for genre in record.genres.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            let genre_id = lookup.genre_id(conn, genre)?;
            link_genre.execute(params![song_id, genre_id])?;
        }
    }

    Ok(BatchResult {
        songs_added,
        songs_removed: removed.count,
        artists_created: lookup.artists_created,
        albums_created: lookup.albums_created,
        genres_created: lookup.genres_created,
        released_files: removed.side_files,
    })
}

fn song_title(record: &ExtractedMetadata) -> String {
    record
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            Path::new(&record.path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{
        get_album_by_id, get_artist_by_name, get_library_stats, get_or_create_folder,
        get_song_by_path, get_song_genre_names,
    };
    use crate::db::DbError;
    use cadenza_core::UNKNOWN_ARTIST;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn record(path: &str, artist: &str, album: Option<&str>) -> ExtractedMetadata {
        ExtractedMetadata {
            path: path.to_string(),
            title: Some(format!("title of {}", path)),
            artist: Some(artist.to_string()),
            album: album.map(str::to_string),
            file_mtime_ns: 1,
            ..Default::default()
        }
    }

    fn setup() -> (Database, i64, ArtworkCache, tempfile::TempDir) {
        let db = Database::new_in_memory().unwrap();
        let folder = db
            .with_conn(|conn| get_or_create_folder(conn, "/music", "music"))
            .unwrap();
        let dir = tempdir().unwrap();
        let cache = ArtworkCache::new(dir.path().join("cache"));
        (db, folder.id, cache, dir)
    }

    fn apply(db: &Database, batch: SongBatch, cache: &ArtworkCache) -> BatchResult {
        db.transaction(|conn| apply_batch(conn, &batch, cache)).unwrap()
    }

    #[test]
    fn test_batch_dedupes_artists_case_insensitively() {
        let (db, folder_id, cache, _dir) = setup();

        let result = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![
                    record("/music/one.mp3", "Daft Punk", None),
                    record("/music/two.mp3", "daft punk", None),
                ],
            },
            &cache,
        );

        assert_eq!(result.songs_added, 2);
        assert_eq!(result.artists_created, 1);

        db.with_conn(|conn| {
            let one = get_song_by_path(conn, "/music/one.mp3")?.unwrap();
            let two = get_song_by_path(conn, "/music/two.mp3")?.unwrap();
            assert_eq!(one.artist_id, two.artist_id);
            assert_eq!(one.folder_id, folder_id);
            assert_eq!(get_library_stats(conn)?.artists, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_non_ascii_names_dedupe_across_batches() {
        let (db, folder_id, cache, _dir) = setup();

        let mut first = record("/music/joga.mp3", "Björk", Some("Début"));
        first.genres = vec!["Électronique".into()];
        let created = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![first],
            },
            &cache,
        );
        assert_eq!(created.artists_created, 1);

        let mut second = record("/music/human.mp3", "BJÖRK", Some("DÉBUT"));
        second.genres = vec!["ÉLECTRONIQUE".into()];
        let result = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![second],
            },
            &cache,
        );

        assert_eq!(result.artists_created, 0);
        assert_eq!(result.albums_created, 0);
        assert_eq!(result.genres_created, 0);
        db.with_conn(|conn| {
            let one = get_song_by_path(conn, "/music/joga.mp3")?.unwrap();
            let two = get_song_by_path(conn, "/music/human.mp3")?.unwrap();
            assert_eq!(one.artist_id, two.artist_id);
            assert_eq!(one.album_id, two.album_id);
            let stats = get_library_stats(conn)?;
            assert_eq!((stats.artists, stats.albums, stats.genres), (1, 1, 1));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_batch_reuses_existing_rows() {
        let (db, folder_id, cache, _dir) = setup();
        db.with_conn(|conn| {
            conn.execute("INSERT INTO artists (name) VALUES ('Daft Punk')", [])?;
            conn.execute("INSERT INTO genres (name) VALUES ('Electronic')", [])?;
            Ok(())
        })
        .unwrap();

        let mut rec = record("/music/one.mp3", "DAFT PUNK", Some("Discovery"));
        rec.genres = vec!["electronic".into(), "House".into(), "house ".into()];
        let result = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![rec],
            },
            &cache,
        );

        assert_eq!(result.artists_created, 0);
        assert_eq!(result.albums_created, 1);
        assert_eq!(result.genres_created, 1);

        db.with_conn(|conn| {
            let song = get_song_by_path(conn, "/music/one.mp3")?.unwrap();
            assert_eq!(
                get_song_genre_names(conn, song.id)?,
                vec!["Electronic".to_string(), "House".to_string()]
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_album_keyed_by_album_artist_and_year_backfilled() {
        let (db, folder_id, cache, _dir) = setup();

        let mut first = record("/music/1.mp3", "Guest", Some("Compilation"));
        first.album_artist = Some("Various Artists".into());
        let mut second = record("/music/2.mp3", "Other Guest", Some("compilation"));
        second.album_artist = Some("Various Artists".into());
        second.year = Some(2001);

        let result = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![first, second],
            },
            &cache,
        );

        assert_eq!(result.albums_created, 1);
        assert_eq!(result.artists_created, 3);

        db.with_conn(|conn| {
            let song = get_song_by_path(conn, "/music/1.mp3")?.unwrap();
            let album = get_album_by_id(conn, song.album_id.unwrap())?.unwrap();
            let various = get_artist_by_name(conn, "various artists")?.unwrap();
            assert_eq!(album.artist_id, various.id);
            assert_ne!(song.artist_id, various.id);
            assert_eq!(album.year, Some(2001));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_untagged_file_gets_unknown_artist_and_stem_title() {
        let (db, folder_id, cache, _dir) = setup();

        let rec = ExtractedMetadata {
            path: "/music/untitled track.flac".into(),
            file_mtime_ns: 5,
            ..Default::default()
        };
        apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![rec],
            },
            &cache,
        );

        db.with_conn(|conn| {
            let song = get_song_by_path(conn, "/music/untitled track.flac")?.unwrap();
            let artist = get_artist_by_name(conn, UNKNOWN_ARTIST)?.unwrap();
            assert_eq!(song.artist_id, artist.id);
            assert_eq!(song.title, "untitled track");
            assert_eq!(song.album_id, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_embedded_art_propagates_to_album() {
        let (db, folder_id, cache, _dir) = setup();

        let plain = record("/music/1.mp3", "A", Some("Record"));
        let mut with_art = record("/music/2.mp3", "A", Some("Record"));
        with_art.embedded_art = Some(vec![0xFF, 0xD8, 0xFF, 0xE0, 9]);

        apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![plain, with_art],
            },
            &cache,
        );

        db.with_conn(|conn| {
            let song = get_song_by_path(conn, "/music/2.mp3")?.unwrap();
            let art = song.art_path.clone().unwrap();
            assert!(Path::new(&art).exists());
            let album = get_album_by_id(conn, song.album_id.unwrap())?.unwrap();
            assert_eq!(album.cover_art_path, Some(art));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_failed_records_are_skipped() {
        let (db, folder_id, cache, _dir) = setup();

        let result = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![ExtractedMetadata::failed("/music/bad.mp3", "corrupt")],
            },
            &cache,
        );

        assert_eq!(result.songs_added, 0);
        assert_eq!(result.artists_created, 0);
    }

    #[test]
    fn test_replaced_song_gets_new_row() {
        let (db, folder_id, cache, _dir) = setup();
        apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec![],
                records: vec![record("/music/1.mp3", "A", None)],
            },
            &cache,
        );
        let old = db
            .with_conn(|conn| get_song_by_path(conn, "/music/1.mp3"))
            .unwrap()
            .unwrap();

        let mut updated = record("/music/1.mp3", "A", None);
        updated.title = Some("Remastered".into());
        updated.file_mtime_ns = 2;
        let result = apply(
            &db,
            SongBatch {
                folder_id,
                delete_paths: vec!["/music/1.mp3".into()],
                records: vec![updated],
            },
            &cache,
        );

        assert_eq!(result.songs_removed, 1);
        let new = db
            .with_conn(|conn| get_song_by_path(conn, "/music/1.mp3"))
            .unwrap()
            .unwrap();
        assert_ne!(old.id, new.id);
        assert_eq!(new.title, "Remastered");
        assert_eq!(new.file_mtime_ns, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = with_write_retry(&policy, |attempt| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(DbError::Constraint("unique".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);

        let result: DbResult<()> = with_write_retry(&RetryPolicy::default(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::Constraint("unique".into())) }
        })
        .await;

        assert!(result.unwrap_err().is_write_conflict());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_retry_other_errors() {
        let attempts = AtomicU32::new(0);

        let result: DbResult<()> = with_write_retry(&RetryPolicy::default(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::NotFound("gone".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_conflicting_batch_leaves_no_partial_writes() {
        let (db, folder_id, cache, _dir) = setup();
        db.with_conn(|conn| {
            let other = get_or_create_folder(conn, "/other", "other")?;
            conn.execute("INSERT INTO artists (name) VALUES ('Owner')", [])?;
            conn.execute(
                "INSERT INTO songs (path, folder_id, artist_id, title, file_mtime_ns)
                 VALUES ('/music/taken.mp3', ?, 1, 'taken', 0)",
                [other.id],
            )?;
            Ok(())
        })
        .unwrap();
        let before = db.with_conn(get_library_stats).unwrap();

        let batch = Arc::new(SongBatch {
            folder_id,
            delete_paths: vec![],
            records: vec![
                record("/music/fresh.mp3", "Brand New Artist", Some("Brand New Album")),
                record("/music/taken.mp3", "Owner", None),
            ],
        });
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 1,
        };

        let err = commit_batch(&db, batch, &cache, &policy).await.unwrap_err();

        assert!(err.is_write_conflict());
        assert_eq!(db.with_conn(get_library_stats).unwrap(), before);
    }
}
