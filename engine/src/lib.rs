//! # MediaMirror Engine - Mirror Reconciliation Library
//!
//! A headless engine that keeps two directory trees — a source and a
//! backup — in sync for media files, using content checksums cached in
//! sidecar files to avoid re-hashing unchanged files on every run.
//! Designed as the foundation for multiple UIs (CLI, automation).
//!
//! ## Overview
//!
//! The engine tracks per-file checksum state (real vs cached) and detects
//! four classes of drift:
//! - new source files not yet backed up
//! - orphaned backup files with no source counterpart
//! - local checksum discrepancies (file content no longer matches its
//!   cached checksum)
//! - mirror checksum discrepancies (cached checksums disagree between
//!   mirrors)
//!
//! New source media is backed up automatically; every other correction
//! is driven by an explicit per-item decision supplied by the caller.
//! Progress is reported through callbacks, decoupled from any UI
//! technology.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{ChecksumAlgorithm, SyncConfig, SyncEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = SyncEngine::new(SyncConfig {
//!     source_root: "/media/source".into(),
//!     backup_root: "/media/backup".into(),
//!     libraries: vec!["Videos".to_string(), "Music".to_string()],
//!     stale_after_days: 90,
//!     algorithm: ChecksumAlgorithm::Sha1,
//! })?;
//!
//! engine.load_mirrors()?;
//! engine.load_libraries(None)?;
//!
//! // Copy anything new on source to the backup mirror
//! let copied = engine.backup_new_source_media(None)?;
//! println!("backed up {} files", copied);
//!
//! // Everything else is surfaced for review
//! let summary = engine.drift_summary()?;
//! println!("{} problems need a decision", summary.manual());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **checksum**: digest algorithms and streaming file hashing
//! - **cache**: sidecar checksum record I/O
//! - **media**: per-file state (real and cached checksums, staleness)
//! - **library**: a named media collection under one directory
//! - **mirror**: source/backup mirror roots and their libraries
//! - **sync**: the reconciliation engine over both mirrors
//! - **progress**: progress callback trait
//! - **error**: error types
//! - **fs_ops**: low-level filesystem operations

pub mod cache;
pub mod checksum;
pub mod error;
pub mod fs_ops;
pub mod library;
pub mod media;
pub mod mirror;
pub mod progress;
pub mod sync;

// Re-export main types and functions
pub use cache::CacheRecord;
pub use checksum::{compute_file_checksum, ChecksumAlgorithm};
pub use error::EngineError;
pub use library::{Library, ALLOWED_MEDIA_EXTENSIONS};
pub use media::MediaEntry;
pub use mirror::Mirror;
pub use progress::SyncProgress;
pub use sync::{
    DriftSummary, LocalResolution, MediaRef, MirrorResolution, OrphanResolution, ScanReport,
    SyncConfig, SyncEngine,
};
