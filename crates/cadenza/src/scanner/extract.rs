//! Bounded-parallel metadata extraction with cooperative cancellation.

use cadenza_core::{ExtractedMetadata, ScanProgress};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::scanner::ProgressSink;
use crate::scanner::metadata::MetadataExtractor;

/// Output of [`extract_all`]
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Successfully extracted records, in no particular order
    pub records: Vec<ExtractedMetadata>,
    /// Paths whose extraction failed; they stay untouched until the next scan
    pub failed: Vec<String>,
    pub cancelled: bool,
}

/// Extract every `(path, mtime_ns)` with at most `parallelism` files in flight.
///
/// Each record's `file_mtime_ns` is taken from the inventory snapshot, not
/// re-read, so the stored value matches what the next diff compares against.
/// Progress is reported every `cadence` completions and once at the end.
pub async fn extract_all(
    extractor: Arc<dyn MetadataExtractor>,
    items: Vec<(String, i64)>,
    parallelism: usize,
    cadence: usize,
    cancel: &CancellationToken,
    progress: Option<ProgressSink>,
) -> ExtractionReport {
    let total = items.len();
    let cadence = cadence.max(1);
    let permits = Arc::new(Semaphore::new(parallelism.max(1)));
    let records = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let failed = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for (path, mtime_ns) in items {
        let extractor = Arc::clone(&extractor);
        let permits = Arc::clone(&permits);
        let records = Arc::clone(&records);
        let failed = Arc::clone(&failed);
        let completed = Arc::clone(&completed);
        let progress = progress.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }

            let job_path = path.clone();
            let result =
                tokio::task::spawn_blocking(move || extractor.extract(Path::new(&job_path))).await;

            let mut metadata = match result {
                Ok(metadata) => metadata,
                Err(e) => ExtractedMetadata::failed(path.clone(), e.to_string()),
            };

            if metadata.extraction_failed {
                debug!(
                    path = %path,
                    error = metadata.error_message.as_deref().unwrap_or("unknown"),
                    "Metadata extraction failed"
                );
                failed.lock().push(path.clone());
            } else {
                metadata.file_mtime_ns = mtime_ns;
                records.lock().push(metadata);
            }

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            let Some(sink) = progress else {
                return;
            };
            if done % cadence == 0 || done == total {
                let new_items = records.lock().len();
                sink(ScanProgress {
                    status: format!("Reading tags ({}/{})", done, total),
                    percent: ScanProgress::percent_of(done, total),
                    current_path: Some(path),
                    total_files: total,
                    new_items,
                });
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Extraction task aborted");
        }
    }

    let records = std::mem::take(&mut *records.lock());
    let failed = std::mem::take(&mut *failed.lock());
    ExtractionReport {
        records,
        failed,
        cancelled: cancel.is_cancelled(),
    }
}
