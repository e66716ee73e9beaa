//! Phase 1: Inventory - filesystem walk and comparison with the catalog.

use cadenza_core::{FolderDiff, diff_snapshots};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::scanner::ScanResult;
use crate::scanner::fs::FileSystem;

/// Result of the inventory phase
#[derive(Debug, Default)]
pub struct InventoryResult {
    pub diff: FolderDiff,
    /// `{path -> mtime_ns}` for every file seen on disk
    pub disk: HashMap<String, i64>,
    /// Files whose timestamp could not be read
    pub skipped: usize,
}

impl InventoryResult {
    /// mtime recorded during the walk for a path to extract
    pub fn mtime_of(&self, path: &str) -> Option<i64> {
        self.disk.get(path).copied()
    }
}

/// Walk `root` and diff it against the catalog's `{path -> mtime}` snapshot.
///
/// A file whose timestamp read fails is left out of the disk snapshot, which
/// makes a previously cataloged copy show up in `to_delete`.
pub fn run_inventory(
    fs: &dyn FileSystem,
    catalog: &HashMap<String, i64>,
    root: &Path,
    recursive: bool,
) -> ScanResult<InventoryResult> {
    let mut result = InventoryResult::default();

    for path in fs.enumerate_files(root, recursive)? {
        match fs.modified_ns(&path) {
            Ok(mtime_ns) => {
                result.disk.insert(path.to_string_lossy().into_owned(), mtime_ns);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping file with unreadable timestamp");
                result.skipped += 1;
            }
        }
    }

    result.diff = diff_snapshots(catalog, &result.disk);
    Ok(result)
}
