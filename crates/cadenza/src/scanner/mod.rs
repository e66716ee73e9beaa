//! Music library scanner module.
//!
//! A scan runs in two phases:
//! - Inventory: filesystem walk + mtime read, diffed against the catalog
//! - Extraction: tag parsing, only for new and modified files
//!
//! A rescan of an unchanged folder never opens a single audio file.

pub mod artwork;
pub mod extract;
pub mod fs;
pub mod inventory;
pub mod metadata;

use cadenza_core::ScanProgress;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::db::DbError;

/// Supported audio file extensions
pub const AUDIO_EXTENSIONS: &[&str] = &[
    ".mp3", ".m4a", ".flac", ".ogg", ".wav", ".aac", ".wma", ".opus", ".ape", ".aiff",
];

/// Scanner error types
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Callback receiving scan progress reports
pub type ProgressSink = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Check if a path has a supported audio extension
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            AUDIO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("song.mp3")));
        assert!(is_audio_file(Path::new("song.MP3")));
        assert!(is_audio_file(Path::new("song.flac")));
        assert!(is_audio_file(Path::new("song.opus")));
        assert!(!is_audio_file(Path::new("image.jpg")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[test]
    fn test_is_audio_file_with_path() {
        assert!(is_audio_file(&PathBuf::from("/music/artist/album/track.FLAC")));
        assert!(!is_audio_file(&PathBuf::from("/music/artist/album/cover.jpg")));
    }
}
