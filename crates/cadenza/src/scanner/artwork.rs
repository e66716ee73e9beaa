//! On-disk cache for artwork and lyrics side-files.
//!
//! Embedded art and lyrics are stored content-addressed, so songs sharing
//! the same picture share one file. Artist images are keyed by artist id.
//! Only files under the cache root are ever deleted by the engine.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Standard filenames to look for folder artwork (case-insensitive)
pub const ARTWORK_FILENAMES: &[&str] = &[
    "cover.jpg",
    "cover.jpeg",
    "cover.png",
    "folder.jpg",
    "folder.jpeg",
    "folder.png",
    "album.jpg",
    "album.jpeg",
    "album.png",
    "front.jpg",
    "front.jpeg",
    "front.png",
    "artwork.jpg",
    "artwork.jpeg",
    "artwork.png",
];

/// Side-file cache rooted at a directory
#[derive(Debug, Clone)]
pub struct ArtworkCache {
    root: PathBuf,
}

impl ArtworkCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write embedded picture bytes, returning the cached path
    pub fn store_embedded_art(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let name = format!("{}.{}", content_hash(bytes), image_extension(bytes));
        let path = self.root.join("art").join(name);
        write_if_absent(&path, bytes)?;
        Ok(path)
    }

    /// Write embedded lyrics text, returning the cached path
    pub fn store_lyrics(&self, text: &str) -> io::Result<PathBuf> {
        let path = self
            .root
            .join("lyrics")
            .join(format!("{}.txt", content_hash(text.as_bytes())));
        write_if_absent(&path, text.as_bytes())?;
        Ok(path)
    }

    /// Where the downloaded image for an artist lives
    pub fn artist_image_path(&self, artist_id: i64) -> PathBuf {
        self.root.join("artists").join(format!("{}.jpg", artist_id))
    }

    /// Whether `path` is a file this cache manages
    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && path != self.root
    }
}

fn content_hash(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// File extension for image bytes, sniffed from the magic number
pub fn image_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'B', b'M', ..] => "bmp",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "jpg",
    }
}

/// Write `bytes` to `path` through a temp file + rename, unless it exists
pub fn write_if_absent(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Find folder-based artwork next to an audio file's directory
pub fn find_folder_artwork(folder: &Path) -> Option<PathBuf> {
    // Try exact filenames first
    for filename in ARTWORK_FILENAMES {
        let artwork_path = folder.join(filename);
        if artwork_path.is_file() {
            return Some(artwork_path);
        }
    }

    // Try case-insensitive search
    fs::read_dir(folder)
        .ok()?
        .filter_map(|e| e.ok())
        .find(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            ARTWORK_FILENAMES.contains(&name.as_str()) && entry.path().is_file()
        })
        .map(|entry| entry.path())
}
