//! Catalog queries for folders, songs and artists.
//!
//! Plain functions over a borrowed `Connection` so they compose inside a
//! caller-owned transaction.

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::{HashMap, HashSet};

use crate::db::{
    Album, Artist, ArtistRef, DbError, DbResult, Folder, LibraryStats, Song,
};

/// SQLite caps bound parameters per statement; stay well below it
pub const MAX_PARAMS_PER_STATEMENT: usize = 500;

const SONG_COLUMNS: &str = "id, path, folder_id, artist_id, album_id, title, duration,
    track_number, disc_number, year, bitrate, sample_rate, channels,
    file_size, file_mtime_ns, art_path, lyrics_path";

fn row_to_folder(row: &Row) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get("id")?,
        path: row.get("path")?,
        name: row.get("name")?,
        last_modified_ns: row.get("last_modified_ns")?,
        last_scanned_at: row.get("last_scanned_at")?,
    })
}

fn row_to_song(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get("id")?,
        path: row.get("path")?,
        folder_id: row.get("folder_id")?,
        artist_id: row.get("artist_id")?,
        album_id: row.get("album_id")?,
        title: row.get("title")?,
        duration: row.get("duration")?,
        track_number: row.get("track_number")?,
        disc_number: row.get("disc_number")?,
        year: row.get("year")?,
        bitrate: row.get("bitrate")?,
        sample_rate: row.get("sample_rate")?,
        channels: row.get("channels")?,
        file_size: row.get::<_, Option<i64>>("file_size")?.unwrap_or(0),
        file_mtime_ns: row.get("file_mtime_ns")?,
        art_path: row.get("art_path")?,
        lyrics_path: row.get("lyrics_path")?,
    })
}

fn row_to_artist(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get("id")?,
        name: row.get("name")?,
        biography: row.get("biography")?,
        image_path: row.get("image_path")?,
        metadata_checked_at: row.get("metadata_checked_at")?,
    })
}

fn row_to_album(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get("id")?,
        title: row.get("title")?,
        artist_id: row.get("artist_id")?,
        year: row.get("year")?,
        cover_art_path: row.get("cover_art_path")?,
    })
}

// ============================================
// Folders
// ============================================

pub fn get_folder_by_id(conn: &Connection, folder_id: i64) -> DbResult<Option<Folder>> {
    Ok(conn
        .query_row(
            "SELECT id, path, name, last_modified_ns, last_scanned_at FROM folders WHERE id = ?",
            [folder_id],
            row_to_folder,
        )
        .optional()?)
}

pub fn get_folder_by_path(conn: &Connection, path: &str) -> DbResult<Option<Folder>> {
    Ok(conn
        .query_row(
            "SELECT id, path, name, last_modified_ns, last_scanned_at FROM folders WHERE path = ?",
            [path],
            row_to_folder,
        )
        .optional()?)
}

/// All folders ordered by path
pub fn get_all_folders(conn: &Connection) -> DbResult<Vec<Folder>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, name, last_modified_ns, last_scanned_at FROM folders ORDER BY path",
    )?;
    let folders = stmt
        .query_map([], row_to_folder)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(folders)
}

/// Insert a folder, or return the existing row for the same path
pub fn get_or_create_folder(conn: &Connection, path: &str, name: &str) -> DbResult<Folder> {
    conn.execute(
        "INSERT INTO folders (path, name) VALUES (?, ?) ON CONFLICT(path) DO NOTHING",
        params![path, name],
    )?;
    get_folder_by_path(conn, path)?.ok_or_else(|| DbError::NotFound(format!("folder {}", path)))
}

/// Record a completed scan of the folder
pub fn mark_folder_scanned(
    conn: &Connection,
    folder_id: i64,
    last_modified_ns: Option<i64>,
) -> DbResult<bool> {
    let updated = conn.execute(
        "UPDATE folders SET last_modified_ns = ?, last_scanned_at = strftime('%s','now') WHERE id = ?",
        params![last_modified_ns, folder_id],
    )?;
    Ok(updated > 0)
}

/// Delete a folder and (by cascade) its songs.
///
/// Returns whether a row was deleted and the cached side-files its songs
/// referenced.
pub fn delete_folder(conn: &Connection, folder_id: i64) -> DbResult<(bool, Vec<String>)> {
    let mut stmt =
        conn.prepare("SELECT art_path, lyrics_path FROM songs WHERE folder_id = ?")?;
    let side_files = collect_side_files(stmt.query_map([folder_id], side_file_pair)?)?;

    let deleted = conn.execute("DELETE FROM folders WHERE id = ?", [folder_id])?;
    Ok((deleted > 0, side_files))
}

// ============================================
// Songs
// ============================================

/// `{path -> file_mtime_ns}` for every song recorded under the folder
pub fn get_folder_fingerprints(conn: &Connection, folder_id: i64) -> DbResult<HashMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT path, file_mtime_ns FROM songs WHERE folder_id = ?")?;
    let fingerprints = stmt
        .query_map([folder_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashMap<String, i64>, _>>()?;
    Ok(fingerprints)
}

/// Songs removed by [`delete_songs_by_paths`]
#[derive(Debug, Default)]
pub struct DeletedSongs {
    pub count: usize,
    /// Cached art/lyrics files the deleted rows referenced
    pub side_files: Vec<String>,
}

/// Delete songs by path (case-insensitive), in chunks
pub fn delete_songs_by_paths(conn: &Connection, paths: &[String]) -> DbResult<DeletedSongs> {
    let mut result = DeletedSongs::default();

    for chunk in paths.chunks(MAX_PARAMS_PER_STATEMENT) {
        let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");

        let mut stmt = conn.prepare(&format!(
            "SELECT art_path, lyrics_path FROM songs WHERE path IN ({})",
            placeholders
        ))?;
        result
            .side_files
            .extend(collect_side_files(stmt.query_map(params_from_iter(chunk), side_file_pair)?)?);

        let deleted = conn.execute(
            &format!("DELETE FROM songs WHERE path IN ({})", placeholders),
            params_from_iter(chunk),
        )?;
        result.count += deleted;
    }

    Ok(result)
}

pub fn get_song_by_path(conn: &Connection, path: &str) -> DbResult<Option<Song>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM songs WHERE path = ?", SONG_COLUMNS),
            [path],
            row_to_song,
        )
        .optional()?)
}

pub fn get_songs_in_folder(conn: &Connection, folder_id: i64) -> DbResult<Vec<Song>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM songs WHERE folder_id = ? ORDER BY path",
        SONG_COLUMNS
    ))?;
    let songs = stmt
        .query_map([folder_id], row_to_song)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(songs)
}

/// Genre names attached to a song, alphabetically
pub fn get_song_genre_names(conn: &Connection, song_id: i64) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT g.name FROM genres g
         JOIN song_genres sg ON sg.genre_id = g.id
         WHERE sg.song_id = ?
         ORDER BY g.name",
    )?;
    let names = stmt
        .query_map([song_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

fn side_file_pair(row: &Row) -> rusqlite::Result<(Option<String>, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn collect_side_files(
    rows: impl Iterator<Item = rusqlite::Result<(Option<String>, Option<String>)>>,
) -> DbResult<Vec<String>> {
    let mut files = Vec::new();
    for row in rows {
        let (art, lyrics) = row?;
        files.extend(art);
        files.extend(lyrics);
    }
    Ok(files)
}

// ============================================
// Artists & albums
// ============================================

pub fn get_artist_by_id(conn: &Connection, artist_id: i64) -> DbResult<Option<Artist>> {
    Ok(conn
        .query_row(
            "SELECT id, name, biography, image_path, metadata_checked_at FROM artists WHERE id = ?",
            [artist_id],
            row_to_artist,
        )
        .optional()?)
}

/// Case-insensitive lookup by name
pub fn get_artist_by_name(conn: &Connection, name: &str) -> DbResult<Option<Artist>> {
    Ok(conn
        .query_row(
            "SELECT id, name, biography, image_path, metadata_checked_at FROM artists WHERE name = ?",
            [name.trim()],
            row_to_artist,
        )
        .optional()?)
}

pub fn get_album_by_id(conn: &Connection, album_id: i64) -> DbResult<Option<Album>> {
    Ok(conn
        .query_row(
            "SELECT id, title, artist_id, year, cover_art_path FROM albums WHERE id = ?",
            [album_id],
            row_to_album,
        )
        .optional()?)
}

/// Artists the enrichment loop has not visited yet, ordered by name.
///
/// `exclude` holds ids skipped earlier in the same run (inconclusive
/// provider answers) so a run cannot spin on them.
pub fn get_artists_needing_metadata(
    conn: &Connection,
    limit: usize,
    exclude: &HashSet<i64>,
) -> DbResult<Vec<ArtistRef>> {
    let mut stmt = conn.prepare(
        "SELECT id, name FROM artists
         WHERE metadata_checked_at IS NULL
         ORDER BY name
         LIMIT ?",
    )?;
    let fetch = (limit + exclude.len()) as i64;
    let artists = stmt
        .query_map([fetch], |row| {
            Ok(ArtistRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .filter(|r| r.as_ref().map_or(true, |a| !exclude.contains(&a.id)))
        .take(limit)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(artists)
}

/// Apply enrichment results and stamp the "checked" marker.
///
/// `None` leaves the stored value untouched. Returns `false` when the
/// artist no longer exists.
pub fn update_artist_metadata(
    conn: &Connection,
    artist_id: i64,
    biography: Option<&str>,
    image_path: Option<&str>,
    checked_at: i64,
) -> DbResult<bool> {
    let updated = conn.execute(
        "UPDATE artists SET
            biography = COALESCE(?, biography),
            image_path = COALESCE(?, image_path),
            metadata_checked_at = ?
         WHERE id = ?",
        params![biography, image_path, checked_at, artist_id],
    )?;
    Ok(updated > 0)
}

// ============================================
// Library-wide
// ============================================

pub fn get_library_stats(conn: &Connection) -> DbResult<LibraryStats> {
    let count = |table: &str| -> DbResult<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
    };

    Ok(LibraryStats {
        folders: count("folders")?,
        songs: count("songs")?,
        artists: count("artists")?,
        albums: count("albums")?,
        genres: count("genres")?,
    })
}

/// Remove every catalog row
pub fn clear_catalog(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        DELETE FROM song_genres;
        DELETE FROM songs;
        DELETE FROM albums;
        DELETE FROM artists;
        DELETE FROM genres;
        DELETE FROM folders;
        ",
    )?;
    Ok(())
}
