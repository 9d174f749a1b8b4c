//! Error types for the mirror engine.
//!
//! The primary error type is `EngineError`. Operations on a single item
//! (one copy, one delete, one cache read) fail with an `EngineError`;
//! batch operations report per-file errors through callbacks and keep
//! processing the remaining files.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Grouped by class:
/// - precondition violations (`MirrorsNotLoaded`, `MediaNotTracked`,
///   `UnresolvedLocalDiscrepancies`) — caller error, never retried
/// - not-found (`MirrorRootNotFound`, `LibraryNotFound`, `FileNotFound`) —
///   environment or configuration error
/// - `AlreadyExists` — destination collision; non-fatal inside batches
/// - `ChecksumMismatch` — data-integrity signal, never auto-resolved
/// - `MalformedCacheRecord` — corrupt sidecar; fatal for that file only
/// - I/O wrappers carrying the failing path
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation that requires loaded mirrors was called before
    /// `load_mirrors`.
    #[error("mirrors are not loaded")]
    MirrorsNotLoaded,

    /// Mirror root directory does not exist.
    #[error("mirror root does not exist: {}", .path.display())]
    MirrorRootNotFound { path: PathBuf },

    /// A configured library directory is missing on the source mirror.
    /// (Backup mirrors provision missing library directories instead.)
    #[error("library directory does not exist on source mirror: {}", .path.display())]
    LibraryNotFound { path: PathBuf },

    /// A file that an operation requires does not exist.
    #[error("file does not exist: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// Copy destination already present, either on disk or in the
    /// library index.
    #[error("file already exists in library: {}", .path.display())]
    AlreadyExists { path: PathBuf },

    /// The given path is not a key in the library's media index.
    #[error("media is not tracked by library '{}': {}", .library, .path_in_library.display())]
    MediaNotTracked {
        library: String,
        path_in_library: PathBuf,
    },

    /// Real and expected checksums disagree. Requires an explicit
    /// operator decision; the engine never resolves this on its own.
    #[error("checksum mismatch for {}: expected {}, got {}", .path.display(), .expected, .actual)]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The sidecar cache record could not be parsed.
    #[error("malformed cache record {}: {}", .path.display(), .reason)]
    MalformedCacheRecord { path: PathBuf, reason: String },

    /// Mirror-discrepancy resolution was attempted while local
    /// discrepancies are still unresolved. Mirror comparison trusts
    /// cached checksums, so local discrepancies must be cleared first.
    #[error("{} local checksum discrepancies must be resolved first", .count)]
    UnresolvedLocalDiscrepancies { count: usize },

    /// Failed to read from a file.
    #[error("failed to read file: {}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a file.
    #[error("failed to write file: {}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to remove a file or directory.
    #[error("failed to remove: {}", .path.display())]
    RemoveError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to enumerate a directory tree.
    #[error("failed to enumerate directory: {}", .path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory: {}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
