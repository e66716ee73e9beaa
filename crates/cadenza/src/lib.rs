//! Library synchronization and enrichment engine.
//!
//! [`LibraryEngine`] keeps a SQLite catalog of songs, artists, albums and
//! genres in step with music folders on disk, and fills in artist
//! biographies and images from remote providers in the background.

pub mod config;
pub mod db;
pub mod engine;
pub mod enrichment;
pub mod lastfm;
pub mod scanner;
pub mod theaudiodb;

pub use cadenza_core::{ScanOutcome, ScanProgress, ScanStatus, ServiceResult};
pub use config::EngineConfig;
pub use db::{Database, DbError};
pub use engine::{Collaborators, LibraryEngine, RefreshSummary};
pub use enrichment::ArtistMetadataUpdated;
pub use scanner::{ProgressSink, ScanError};
