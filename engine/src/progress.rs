//! Progress reporting trait.
//!
//! Decouples the engine from any specific UI technology. The CLI provides
//! a console implementation; other front ends can implement the same
//! trait. All methods are called synchronously while the operation runs.

use std::path::Path;

/// Callbacks for long-running engine operations.
///
/// Counts are reported rather than orderings; callers must not assume
/// files are visited in any particular sequence.
pub trait SyncProgress: Send {
    /// Called after each media file admitted during library enumeration.
    fn on_library_loading(&self, is_source: bool, library: &str, media_count: usize);

    /// Called once before a backup batch, with the number of new files.
    fn on_backup_start(&self, library: &str, total: usize);

    /// Called before each file in a backup batch is copied.
    fn on_backup_progress(&self, library: &str, index: usize, total: usize, path: &Path);

    /// Called when one file in a backup batch fails. The batch continues
    /// with the remaining files.
    fn on_backup_error(&self, library: &str, path: &Path, message: &str);

    /// Called once before a stale-cache refresh pass, with the number of
    /// stale entries.
    fn on_refresh_start(&self, is_source: bool, library: &str, total: usize);

    /// Called before each stale entry is re-hashed.
    fn on_refresh_progress(
        &self,
        is_source: bool,
        library: &str,
        index: usize,
        total: usize,
        path: &Path,
    );
}
