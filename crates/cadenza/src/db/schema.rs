//! Database schema definitions and migrations.
//!
//! Tables are created idempotently; `run_migrations` upgrades catalogs
//! written by earlier versions of the schema.

use cadenza_core::{cmp_folded, fold_case};
use rusqlite::Connection;
use tracing::info;

use crate::db::DbResult;

/// Unicode case-insensitive collation for paths and names (`NOCASE` folds
/// ASCII only)
pub const UNICASE: &str = "UNICASE";

/// Register the catalog collations on `conn`; needed on every connection
pub fn register_collations(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_collation(UNICASE, cmp_folded)
}

/// In-memory lookup key matching the `UNICASE` collation
pub fn name_key(name: &str) -> String {
    fold_case(name.trim())
}

/// SQL statements for creating all database tables
pub const CREATE_TABLES: &[(&str, &str)] = &[
    (
        "folders",
        "CREATE TABLE IF NOT EXISTS folders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE COLLATE UNICASE,
            name TEXT NOT NULL,
            last_modified_ns INTEGER,
            last_scanned_at INTEGER,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
        )",
    ),
    (
        "artists",
        "CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE UNICASE,
            biography TEXT,
            image_path TEXT
        )",
    ),
    (
        "albums",
        "CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL COLLATE UNICASE,
            artist_id INTEGER NOT NULL,
            year INTEGER,
            cover_art_path TEXT,
            UNIQUE(title, artist_id),
            FOREIGN KEY (artist_id) REFERENCES artists(id)
        )",
    ),
    (
        "genres",
        "CREATE TABLE IF NOT EXISTS genres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE UNICASE
        )",
    ),
    (
        "songs",
        "CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE COLLATE UNICASE,
            folder_id INTEGER NOT NULL,
            artist_id INTEGER NOT NULL,
            album_id INTEGER,
            title TEXT NOT NULL,
            duration REAL,
            track_number INTEGER,
            disc_number INTEGER,
            year INTEGER,
            bitrate INTEGER,
            sample_rate INTEGER,
            channels INTEGER,
            file_size INTEGER DEFAULT 0,
            file_mtime_ns INTEGER NOT NULL,
            art_path TEXT,
            lyrics_path TEXT,
            added_at INTEGER NOT NULL DEFAULT (strftime('%s','now')),
            FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE,
            FOREIGN KEY (artist_id) REFERENCES artists(id),
            FOREIGN KEY (album_id) REFERENCES albums(id)
        )",
    ),
    (
        "song_genres",
        "CREATE TABLE IF NOT EXISTS song_genres (
            song_id INTEGER NOT NULL,
            genre_id INTEGER NOT NULL,
            PRIMARY KEY (song_id, genre_id),
            FOREIGN KEY (song_id) REFERENCES songs(id) ON DELETE CASCADE,
            FOREIGN KEY (genre_id) REFERENCES genres(id) ON DELETE CASCADE
        )",
    ),
];

/// Create all database tables
pub fn create_tables(conn: &Connection) -> DbResult<()> {
    register_collations(conn)?;
    for (_, sql) in CREATE_TABLES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Run database migrations for schema updates
pub fn run_migrations(conn: &Connection) -> DbResult<()> {
    // Migration: enrichment work-queue marker
    let artist_columns = get_table_columns(conn, "artists")?;
    if !artist_columns.contains(&"metadata_checked_at".to_string()) {
        info!("[migration] Adding metadata_checked_at column to artists table");
        conn.execute("ALTER TABLE artists ADD COLUMN metadata_checked_at INTEGER", [])?;
    }

    let indexes = [
        ("idx_songs_folder", "CREATE INDEX idx_songs_folder ON songs(folder_id)"),
        ("idx_songs_artist", "CREATE INDEX idx_songs_artist ON songs(artist_id)"),
        ("idx_songs_album", "CREATE INDEX idx_songs_album ON songs(album_id)"),
        ("idx_albums_artist", "CREATE INDEX idx_albums_artist ON albums(artist_id)"),
        (
            "idx_song_genres_genre",
            "CREATE INDEX idx_song_genres_genre ON song_genres(genre_id)",
        ),
        (
            "idx_artists_unchecked",
            "CREATE INDEX idx_artists_unchecked ON artists(name) WHERE metadata_checked_at IS NULL",
        ),
    ];

    for (name, sql) in indexes {
        if !index_exists(conn, name)? {
            info!("[migration] Creating index {}", name);
            conn.execute(sql, [])?;
        }
    }

    Ok(())
}

/// Get column names for a table
fn get_table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(columns)
}

/// Check if an index exists
fn index_exists(conn: &Connection, index_name: &str) -> DbResult<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?",
        [index_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).expect("Failed to create tables");

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert_eq!(
            tables,
            vec!["albums", "artists", "folders", "genres", "song_genres", "songs"]
        );
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).expect("Failed to create tables");

        run_migrations(&conn).expect("First migration failed");
        run_migrations(&conn).expect("Second migration failed");

        let columns = get_table_columns(&conn, "artists").unwrap();
        assert!(columns.contains(&"metadata_checked_at".to_string()));
        assert!(index_exists(&conn, "idx_songs_folder").unwrap());
        assert!(index_exists(&conn, "idx_artists_unchecked").unwrap());
    }

    #[test]
    fn test_song_path_unique_ignores_case() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO folders (path, name) VALUES ('/m', 'm')", [])
            .unwrap();
        conn.execute("INSERT INTO artists (name) VALUES ('A')", []).unwrap();
        conn.execute(
            "INSERT INTO songs (path, folder_id, artist_id, title, file_mtime_ns)
             VALUES ('/m/a.mp3', 1, 1, 'a', 0)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO songs (path, folder_id, artist_id, title, file_mtime_ns)
             VALUES ('/M/A.MP3', 1, 1, 'a', 0)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_names_unique_ignoring_unicode_case() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO artists (name) VALUES ('Björk')", []).unwrap();
        assert!(conn.execute("INSERT INTO artists (name) VALUES ('BJÖRK')", []).is_err());

        let id: i64 = conn
            .query_row("SELECT id FROM artists WHERE name IN ('bjÖrk')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(id, 1);

        conn.execute("INSERT INTO genres (name) VALUES ('Électro')", []).unwrap();
        assert!(conn.execute("INSERT INTO genres (name) VALUES ('ÉLECTRO')", []).is_err());
        assert_eq!(name_key("  ÉLECTRO "), "électro");
    }
}
