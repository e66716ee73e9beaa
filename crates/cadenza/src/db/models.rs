//! Catalog row types.
//!
//! These structs represent the data stored in the SQLite database
//! and are serializable for the UI layer.

use serde::{Deserialize, Serialize};

/// A watched library folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub last_modified_ns: Option<i64>,
    pub last_scanned_at: Option<i64>,
}

/// Song row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub path: String,
    pub folder_id: i64,
    pub artist_id: i64,
    pub album_id: Option<i64>,
    pub title: String,
    pub duration: Option<f64>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub file_size: i64,
    pub file_mtime_ns: i64,
    pub art_path: Option<String>,
    pub lyrics_path: Option<String>,
}

/// Artist row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub biography: Option<String>,
    pub image_path: Option<String>,
    /// Unix seconds; `None` means the enrichment loop has not looked yet
    pub metadata_checked_at: Option<i64>,
}

/// Album row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub artist_id: i64,
    pub year: Option<i32>,
    pub cover_art_path: Option<String>,
}

/// Genre row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Minimal artist projection handed to the enrichment loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRef {
    pub id: i64,
    pub name: String,
}

/// Library statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub folders: i64,
    pub songs: i64,
    pub artists: i64,
    pub albums: i64,
    pub genres: i64,
}
