//! Change detection between the catalog and the filesystem.
//!
//! Both sides are reduced to `{path -> mtime_ns}` snapshots and compared
//! case-insensitively. The diff is a pure function: it holds no locks and
//! the inputs may be stale by the time the result is used.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Result of comparing the catalog view of a folder with the disk view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDiff {
    /// On disk but not in the catalog (disk spelling)
    pub to_add: Vec<String>,
    /// In both, with a different modification time (disk spelling)
    pub to_update: Vec<String>,
    /// Gone from disk, plus every updated path (catalog spelling).
    /// Updated files are removed and re-added so all fields refresh.
    pub to_delete: Vec<String>,
}

impl FolderDiff {
    /// Files that need metadata extraction
    pub fn to_extract(&self) -> impl Iterator<Item = &String> {
        self.to_add.iter().chain(self.to_update.iter())
    }

    /// Catalog paths whose files no longer exist
    pub fn removed(&self) -> impl Iterator<Item = &String> {
        let updated: std::collections::HashSet<String> =
            self.to_update.iter().map(|p| path_key(p)).collect();
        self.to_delete
            .iter()
            .filter(move |p| !updated.contains(&path_key(p)))
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Case-insensitive comparison key for a file path
pub fn path_key(path: &str) -> String {
    fold_case(path)
}

/// Per-character Unicode lowercase; the catalog's `UNICASE` collation
/// orders strings by exactly this folding.
pub fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Compare two strings by their [`fold_case`] forms without allocating
pub fn cmp_folded(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Diff a catalog snapshot against a disk snapshot.
///
/// Output vectors are sorted so callers see a stable order.
pub fn diff_snapshots(
    catalog: &HashMap<String, i64>,
    disk: &HashMap<String, i64>,
) -> FolderDiff {
    let catalog_by_key: HashMap<String, (&String, i64)> = catalog
        .iter()
        .map(|(path, mtime)| (path_key(path), (path, *mtime)))
        .collect();
    let disk_by_key: HashMap<String, (&String, i64)> = disk
        .iter()
        .map(|(path, mtime)| (path_key(path), (path, *mtime)))
        .collect();

    let mut diff = FolderDiff::default();

    for (key, (disk_path, disk_mtime)) in &disk_by_key {
        match catalog_by_key.get(key) {
            None => diff.to_add.push((*disk_path).clone()),
            Some((catalog_path, catalog_mtime)) if catalog_mtime != disk_mtime => {
                diff.to_update.push((*disk_path).clone());
                diff.to_delete.push((*catalog_path).clone());
            }
            Some(_) => {}
        }
    }

    for (key, (catalog_path, _)) in &catalog_by_key {
        if !disk_by_key.contains_key(key) {
            diff.to_delete.push((*catalog_path).clone());
        }
    }

    diff.to_add.sort();
    diff.to_update.sort();
    diff.to_delete.sort();
    diff
}
