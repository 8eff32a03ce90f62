//! # Packtrack - release bookkeeping for Packs and Apks
//!
//! Packtrack keeps the release history of a content distribution pipeline:
//! - Packs (one lineage per target `sc_version`) and Apks, insert-only
//! - Known Bugs linked to Packs, closable per Pack and globally
//! - SQLite-backed storage behind an explicit store handle
//! - JSON exports consumed by the delivery server

pub mod model;
pub mod clock;
pub mod storage;
pub mod export;
pub mod artifact;
pub mod prompt;
pub mod release;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use model::{Apk, KnownBug, LinkedBug, NewApk, NewPack, Pack, PackBugLink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use storage::{InheritScope, ReleaseStore, StoreStats};
pub use export::{ExportLayout, ExportReport};

/// Result type alias for Packtrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Packtrack operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("A pack named '{0}' already exists")]
    DuplicateName(String),

    #[error("An apk with version name '{0}' already exists")]
    DuplicateVersionName(String),

    #[error("Bug {bug_id} is already linked to pack {pack_id}")]
    DuplicateLink { bug_id: i64, pack_id: i64 },

    #[error("Reference to a missing row: {0}")]
    ForeignKeyViolation(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
