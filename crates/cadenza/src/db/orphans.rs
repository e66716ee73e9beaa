//! Orphan sweep: remove albums, artists and genres no song references.

use rusqlite::{Connection, params_from_iter};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::db::DbResult;
use crate::db::catalog::MAX_PARAMS_PER_STATEMENT;
use crate::scanner::artwork::ArtworkCache;

/// Rows removed by [`reap_orphans`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub albums: usize,
    pub artists: usize,
    pub genres: usize,
    /// Cover and artist-image paths the deleted rows referenced
    pub released_files: Vec<String>,
}

impl ReapReport {
    pub fn total(&self) -> usize {
        self.albums + self.artists + self.genres
    }
}

/// Delete every unreferenced album, artist and genre.
///
/// Albums go first: an artist is an orphan only once it owns no songs
/// and no albums, so it must be checked against the pruned album set.
pub fn reap_orphans(conn: &Connection) -> DbResult<ReapReport> {
    let mut report = ReapReport::default();

    let mut stmt = conn.prepare(
        "SELECT cover_art_path FROM albums
         WHERE cover_art_path IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM songs WHERE songs.album_id = albums.id)",
    )?;
    for path in stmt.query_map([], |row| row.get::<_, String>(0))? {
        report.released_files.push(path?);
    }
    report.albums = conn.execute(
        "DELETE FROM albums
         WHERE NOT EXISTS (SELECT 1 FROM songs WHERE songs.album_id = albums.id)",
        [],
    )?;

    let mut stmt = conn.prepare(
        "SELECT image_path FROM artists
         WHERE image_path IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM songs WHERE songs.artist_id = artists.id)
           AND NOT EXISTS (SELECT 1 FROM albums WHERE albums.artist_id = artists.id)",
    )?;
    for path in stmt.query_map([], |row| row.get::<_, String>(0))? {
        report.released_files.push(path?);
    }
    report.artists = conn.execute(
        "DELETE FROM artists
         WHERE NOT EXISTS (SELECT 1 FROM songs WHERE songs.artist_id = artists.id)
           AND NOT EXISTS (SELECT 1 FROM albums WHERE albums.artist_id = artists.id)",
        [],
    )?;

    report.genres = conn.execute(
        "DELETE FROM genres
         WHERE NOT EXISTS (SELECT 1 FROM song_genres WHERE song_genres.genre_id = genres.id)",
        [],
    )?;

    Ok(report)
}

/// Narrow `candidates` to cache files no catalog row still points at.
///
/// Art and lyrics files are content-addressed and may be shared, and folder
/// artwork used as an album cover lives outside the cache; neither may be
/// removed while referenced or when the cache does not own it.
pub fn unreferenced_cache_files(
    conn: &Connection,
    candidates: &[String],
    cache: &ArtworkCache,
) -> DbResult<Vec<PathBuf>> {
    let owned: Vec<&String> = candidates
        .iter()
        .filter(|p| cache.owns(std::path::Path::new(p.as_str())))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut referenced = HashSet::new();
    for chunk in owned.chunks(MAX_PARAMS_PER_STATEMENT / 4) {
        let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT art_path FROM songs WHERE art_path IN ({p})
             UNION SELECT lyrics_path FROM songs WHERE lyrics_path IN ({p})
             UNION SELECT cover_art_path FROM albums WHERE cover_art_path IN ({p})
             UNION SELECT image_path FROM artists WHERE image_path IN ({p})",
            p = placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = chunk.iter().cycle().take(chunk.len() * 4);
        for path in stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))? {
            referenced.insert(path?);
        }
    }

    let mut unreferenced: Vec<PathBuf> = owned
        .into_iter()
        .filter(|p| !referenced.contains(p.as_str()))
        .map(PathBuf::from)
        .collect();
    unreferenced.sort();
    Ok(unreferenced)
}
