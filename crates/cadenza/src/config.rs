//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::upsert::RetryPolicy;
use crate::enrichment::EnrichmentSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the art/lyrics/artist-image cache
    pub cache_dir: PathBuf,
    pub recursive: bool,
    pub extraction_parallelism: usize,
    /// Report extraction progress every N files
    pub progress_cadence: usize,
    pub write_retry: RetryPolicy,
    pub enrichment_batch_size: usize,
    pub enrichment_request_delay_ms: u64,
    /// How long a reset waits for the enrichment worker to exit
    pub enrichment_stop_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: env::temp_dir().join("cadenza-cache"),
            recursive: true,
            extraction_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            progress_cadence: 25,
            write_retry: RetryPolicy::default(),
            enrichment_batch_size: 50,
            enrichment_request_delay_ms: 250,
            enrichment_stop_grace_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Defaults with `CADENZA_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_var("CADENZA_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(n) = env_var("CADENZA_SCAN_PARALLELISM").and_then(|v| v.parse().ok()) {
            config.extraction_parallelism = n;
        }
        if let Some(n) = env_var("CADENZA_ENRICHMENT_BATCH").and_then(|v| v.parse().ok()) {
            config.enrichment_batch_size = n;
        }
        config
    }

    pub fn enrichment_settings(&self) -> EnrichmentSettings {
        EnrichmentSettings {
            batch_size: self.enrichment_batch_size,
            request_delay: Duration::from_millis(self.enrichment_request_delay_ms),
        }
    }

    pub fn enrichment_stop_grace(&self) -> Duration {
        Duration::from_millis(self.enrichment_stop_grace_ms)
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
