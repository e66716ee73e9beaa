//! Types shared between the synchronization engine and its consumers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Artist name used when a file carries no artist tag
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Metadata extracted from a single audio file.
///
/// A record with `extraction_failed` set is never persisted; the file is
/// retried on the next scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub path: String,
    pub extraction_failed: bool,
    pub error_message: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub file_size: i64,
    /// File modification time in nanoseconds since Unix epoch
    pub file_mtime_ns: i64,
    #[serde(skip)]
    pub embedded_art: Option<Vec<u8>>,
    pub embedded_lyrics: Option<String>,
}

impl ExtractedMetadata {
    /// Build a failure marker for `path`
    pub fn failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            extraction_failed: true,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Track artist, falling back to the sentinel for untagged files
    pub fn track_artist(&self) -> &str {
        non_blank(self.artist.as_deref()).unwrap_or(UNKNOWN_ARTIST)
    }

    /// Album artist, falling back to the track artist
    pub fn effective_album_artist(&self) -> &str {
        non_blank(self.album_artist.as_deref()).unwrap_or_else(|| self.track_artist())
    }

    /// Album title if the file has a non-blank one
    pub fn album_title(&self) -> Option<&str> {
        non_blank(self.album.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Progress report emitted while a scan runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Human readable status line
    pub status: String,
    /// 0-100, or `None` while the total is unknown
    pub percent: Option<u8>,
    /// Most recently completed file
    pub current_path: Option<String>,
    /// Number of files the current phase works through
    pub total_files: usize,
    /// Running count of new items found so far
    pub new_items: usize,
}

impl ScanProgress {
    /// A report without a known percentage
    pub fn indeterminate(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            percent: None,
            current_path: None,
            total_files: 0,
            new_items: 0,
        }
    }

    /// Percentage of `done` out of `total`, clamped to 100
    pub fn percent_of(done: usize, total: usize) -> Option<u8> {
        if total == 0 {
            return None;
        }
        Some(((done.min(total) * 100) / total) as u8)
    }
}

/// Terminal state of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Changes were written to the catalog
    Completed,
    /// The folder matched the catalog
    NoChanges,
    /// The cancellation signal fired; not an error
    Cancelled,
}

/// Summary returned by a folder scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub job_id: String,
    pub folder_id: i64,
    pub status: ScanStatus,
    pub message: String,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
}

impl ScanOutcome {
    /// Whether the scan changed the catalog
    pub fn changed(&self) -> bool {
        self.status == ScanStatus::Completed && (self.added + self.updated + self.removed) > 0
    }
}

/// Result of a remote metadata lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResult<T> {
    Found(T),
    NotFound,
    /// Transient failure (rate limit, outage); retry on a later run
    TemporaryError(String),
    /// The source cannot serve this request; do not retry this session
    PermanentError(String),
}

/// Failure half of a [`ServiceResult`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("temporary provider error: {0}")]
    Temporary(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl<T> ServiceResult<T> {
    /// True when the lookup neither succeeded nor conclusively failed
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, ServiceResult::TemporaryError(_))
    }

    /// Collapse into `Ok(Some)` / `Ok(None)` / `Err`
    pub fn into_result(self) -> Result<Option<T>, ServiceError> {
        match self {
            ServiceResult::Found(value) => Ok(Some(value)),
            ServiceResult::NotFound => Ok(None),
            ServiceResult::TemporaryError(msg) => Err(ServiceError::Temporary(msg)),
            ServiceResult::PermanentError(msg) => Err(ServiceError::Permanent(msg)),
        }
    }
}
