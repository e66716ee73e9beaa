//! cadenza-core: Core library for the cadenza library manager
//!
//! This crate contains the pure (I/O free) pieces of the synchronization
//! engine and the types shared between the engine and its UI/CLI layers.
//!
//! # Architecture
//!
//! - `diff`: catalog-vs-disk change detection over `{path -> mtime}` snapshots
//! - `types`: extracted metadata records, progress reports, scan outcomes and
//!   the remote provider result type
//!
//! # Usage
//!
//! ```
//! use std::collections::HashMap;
//! use cadenza_core::diff::diff_snapshots;
//!
//! let catalog = HashMap::from([("/music/a.mp3".to_string(), 1_i64)]);
//! let disk = HashMap::from([("/music/A.MP3".to_string(), 2_i64)]);
//!
//! let diff = diff_snapshots(&catalog, &disk);
//! assert_eq!(diff.to_update, vec!["/music/A.MP3".to_string()]);
//! ```

pub mod diff;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use diff::{FolderDiff, cmp_folded, diff_snapshots, fold_case, path_key};
pub use types::{
    ExtractedMetadata, ScanOutcome, ScanProgress, ScanStatus, ServiceError, ServiceResult,
    UNKNOWN_ARTIST,
};
