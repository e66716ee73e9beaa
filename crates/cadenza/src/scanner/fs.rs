//! Filesystem access used by the scanner.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::scanner::is_audio_file;

/// Filesystem operations a scan depends on
pub trait FileSystem: Send + Sync {
    /// Audio files under `root`, in walk order
    fn enumerate_files(&self, root: &Path, recursive: bool) -> io::Result<Vec<PathBuf>>;

    /// Modification time in nanoseconds since the Unix epoch
    fn modified_ns(&self, path: &Path) -> io::Result<i64>;

    fn exists(&self, path: &Path) -> bool;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn enumerate_files(&self, root: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            ));
        }

        let walker = if recursive {
            WalkDir::new(root).follow_links(true)
        } else {
            WalkDir::new(root).max_depth(1).follow_links(true)
        };

        Ok(walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect())
    }

    fn modified_ns(&self, path: &Path) -> io::Result<i64> {
        let modified = fs::metadata(path)?.modified()?;
        let since_epoch = modified
            .duration_since(UNIX_EPOCH)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(since_epoch.as_nanos() as i64)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
