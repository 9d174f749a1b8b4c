//! A named, rooted collection of media files.
//!
//! The library owns enumeration, copy-in with post-copy verification,
//! deletion, empty-directory and orphan-sidecar cleanup, and staleness
//! refresh. Its `media` index maps `path_in_library` to the entry and is
//! fully rebuilt on every enumeration — entries for files removed from
//! disk since the last load simply disappear.

use crate::cache::CACHE_DIR_NAME;
use crate::checksum::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::fs_ops;
use crate::media::MediaEntry;
use crate::progress::SyncProgress;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions recognized as media. Everything else is invisible to
/// enumeration.
pub const ALLOWED_MEDIA_EXTENSIONS: &[&str] = &[
    "3gpp", "asf", "avi", "flac", "flv", "m2ts", "m4a", "m4v", "mka", "mkv", "mov", "mp3", "mp4",
    "mpeg-ts", "mpegts", "ogg", "ts", "wav", "wma", "wtv",
];

/// A named media collection rooted at one directory.
#[derive(Debug)]
pub struct Library {
    name: String,
    root: PathBuf,
    is_source: bool,
    algorithm: ChecksumAlgorithm,
    media: BTreeMap<PathBuf, MediaEntry>,
}

impl Library {
    pub fn new(name: String, root: PathBuf, is_source: bool, algorithm: ChecksumAlgorithm) -> Self {
        Library {
            name,
            root,
            is_source,
            algorithm,
            media: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_source(&self) -> bool {
        self.is_source
    }

    /// The media index, keyed by `path_in_library`.
    pub fn media(&self) -> &BTreeMap<PathBuf, MediaEntry> {
        &self.media
    }

    pub fn contains(&self, path_in_library: &Path) -> bool {
        self.media.contains_key(path_in_library)
    }

    pub fn entry_mut(&mut self, path_in_library: &Path) -> Option<&mut MediaEntry> {
        self.media.get_mut(path_in_library)
    }

    fn untracked_error(&self, path_in_library: &Path) -> EngineError {
        EngineError::MediaNotTracked {
            library: self.name.clone(),
            path_in_library: path_in_library.to_path_buf(),
        }
    }

    /// Clear and rebuild the media index by walking the library root.
    ///
    /// `.cache` subtrees are pruned and only files in
    /// [`ALLOWED_MEDIA_EXTENSIONS`] are admitted. The progress callback
    /// fires after each admitted file with the running count. Idempotent:
    /// re-running on an unchanged tree yields an identical index.
    pub fn load_all(&mut self, progress: Option<&dyn SyncProgress>) -> Result<(), EngineError> {
        self.media.clear();

        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.file_name() != OsStr::new(CACHE_DIR_NAME));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone());
                EngineError::EnumerationFailed {
                    path,
                    source: e.into(),
                }
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            let allowed = entry
                .path()
                .extension()
                .map(|x| x.to_string_lossy().to_ascii_lowercase())
                .map(|ext| ALLOWED_MEDIA_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false);
            if !allowed {
                continue;
            }

            let path_in_library = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            self.media.insert(
                path_in_library.clone(),
                MediaEntry::new(
                    entry.into_path(),
                    path_in_library,
                    self.is_source,
                    self.algorithm,
                ),
            );

            if let Some(callback) = progress {
                callback.on_library_loading(self.is_source, &self.name, self.media.len());
            }
        }

        log::debug!(
            "loaded {} media files in {} library '{}'",
            self.media.len(),
            if self.is_source { "source" } else { "backup" },
            self.name
        );
        Ok(())
    }

    /// Copy a file into the library from an outside location.
    ///
    /// The copied file's real checksum is compared against
    /// `expected_checksum`; on a match a fresh cache record is written and
    /// the entry joins the index, on a mismatch the copy is rolled back
    /// (the destination file is deleted) and the error names both
    /// checksums. Fails without touching the filesystem when the source
    /// is missing or the destination already exists.
    pub fn copy_in(
        &mut self,
        source_path: &Path,
        path_in_library: &Path,
        expected_checksum: &str,
    ) -> Result<(), EngineError> {
        if !source_path.exists() {
            return Err(EngineError::FileNotFound {
                path: source_path.to_path_buf(),
            });
        }

        let destination = self.root.join(path_in_library);
        if self.media.contains_key(path_in_library) || destination.exists() {
            return Err(EngineError::AlreadyExists { path: destination });
        }

        fs_ops::copy_file_with_metadata(source_path, &destination)?;

        let mut entry = MediaEntry::new(
            destination.clone(),
            path_in_library.to_path_buf(),
            self.is_source,
            self.algorithm,
        );

        let real = entry.real_checksum()?;
        if real != expected_checksum {
            // Roll back the partial/corrupt copy before reporting
            log::warn!(
                "rolling back copy of {}: checksum mismatch",
                destination.display()
            );
            fs::remove_file(&destination).map_err(|e| EngineError::RemoveError {
                path: destination.clone(),
                source: e,
            })?;
            return Err(EngineError::ChecksumMismatch {
                path: destination,
                expected: expected_checksum.to_string(),
                actual: real,
            });
        }

        // A new file never has a record; no overwrite needed
        entry.cached_checksum()?;
        self.media.insert(path_in_library.to_path_buf(), entry);
        log::info!("copied {} into library '{}'", path_in_library.display(), self.name);
        Ok(())
    }

    /// Delete a tracked media file and its cache record.
    ///
    /// The media file must exist before anything is mutated; the sidecar
    /// is removed first so a failure between the two removals leaves a
    /// file whose record self-heals on next read, never a stale sidecar.
    pub fn delete(&mut self, path_in_library: &Path) -> Result<(), EngineError> {
        let entry = self
            .media
            .get(path_in_library)
            .ok_or_else(|| self.untracked_error(path_in_library))?;

        if !entry.path().exists() {
            return Err(EngineError::FileNotFound {
                path: entry.path().to_path_buf(),
            });
        }

        let sidecar = entry.sidecar_path().to_path_buf();
        let media_path = entry.path().to_path_buf();

        if sidecar.exists() {
            fs::remove_file(&sidecar).map_err(|e| EngineError::RemoveError {
                path: sidecar.clone(),
                source: e,
            })?;
        }
        fs::remove_file(&media_path).map_err(|e| EngineError::RemoveError {
            path: media_path.clone(),
            source: e,
        })?;

        self.media.remove(path_in_library);
        log::info!("deleted {} from library '{}'", path_in_library.display(), self.name);
        Ok(())
    }

    /// All directories under the root (excluding the root itself) that
    /// contain neither files nor subdirectories. Computed freshly on
    /// every call.
    pub fn empty_directories(&self) -> Result<Vec<PathBuf>, EngineError> {
        let mut empty = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone());
                EngineError::EnumerationFailed {
                    path,
                    source: e.into(),
                }
            })?;

            if !entry.file_type().is_dir() || entry.path() == self.root {
                continue;
            }
            let mut children = fs::read_dir(entry.path()).map_err(|e| {
                EngineError::EnumerationFailed {
                    path: entry.path().to_path_buf(),
                    source: e,
                }
            })?;
            if children.next().is_none() {
                empty.push(entry.into_path());
            }
        }
        Ok(empty)
    }

    /// Remove empty directories until none remain. Removing a child can
    /// make its parent newly empty, so this loops to a fixed point rather
    /// than making a single pass. The library root is never removed.
    pub fn delete_empty_directories(&self) -> Result<Vec<PathBuf>, EngineError> {
        let mut deleted = Vec::new();
        loop {
            let empty = self.empty_directories()?;
            if empty.is_empty() {
                break;
            }
            for directory in empty {
                fs::remove_dir(&directory).map_err(|e| EngineError::RemoveError {
                    path: directory.clone(),
                    source: e,
                })?;
                deleted.push(directory);
            }
        }
        Ok(deleted)
    }

    /// Sidecar files under any `.cache` directory whose media file (same
    /// base name, sibling of the `.cache` directory) no longer exists.
    pub fn orphan_cache_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let mut orphans = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone());
                EngineError::EnumerationFailed {
                    path,
                    source: e.into(),
                }
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            let parent = match entry.path().parent() {
                Some(parent) => parent,
                None => continue,
            };
            if parent.file_name() != Some(OsStr::new(CACHE_DIR_NAME)) {
                continue;
            }
            let media_dir = match parent.parent() {
                Some(dir) => dir,
                None => continue,
            };
            // "<name>.<ext>.txt" stems back to "<name>.<ext>"
            let media_name = match entry.path().file_stem() {
                Some(stem) => stem,
                None => continue,
            };
            if !media_dir.join(media_name).exists() {
                orphans.push(entry.into_path());
            }
        }
        Ok(orphans)
    }

    /// Delete all orphan sidecar files; returns the removed paths.
    ///
    /// A file that cannot be removed is logged and skipped — it will be
    /// listed again on the next pass.
    pub fn delete_orphan_cache_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let orphans = self.orphan_cache_files()?;
        let mut removed = Vec::new();
        for orphan in orphans {
            match fs::remove_file(&orphan) {
                Ok(()) => removed.push(orphan),
                Err(e) => log::warn!("failed to remove {}: {}", orphan.display(), e),
            }
        }
        if !removed.is_empty() {
            log::info!(
                "removed {} orphan cache files from library '{}'",
                removed.len(),
                self.name
            );
        }
        Ok(removed)
    }

    /// Paths of entries whose cache record is older than `threshold_days`.
    ///
    /// Entries whose record cannot be read or created are logged and
    /// skipped — a corrupt sidecar is fatal for that file only.
    pub fn stale_media(&mut self, threshold_days: i64) -> Vec<PathBuf> {
        let mut stale = Vec::new();
        for (path_in_library, entry) in self.media.iter_mut() {
            match entry.cache_is_stale(threshold_days) {
                Ok(true) => stale.push(path_in_library.clone()),
                Ok(false) => {}
                Err(e) => log::warn!(
                    "skipping staleness check for {}: {}",
                    path_in_library.display(),
                    e
                ),
            }
        }
        stale
    }

    /// Re-verify every stale entry: matching checksums get a refreshed
    /// record, mismatches are returned for operator review. Mismatches
    /// are never auto-resolved.
    pub fn refresh_stale(
        &mut self,
        threshold_days: i64,
        progress: Option<&dyn SyncProgress>,
    ) -> Vec<PathBuf> {
        // Snapshot before mutating; refreshing rewrites records in place
        let stale = self.stale_media(threshold_days);
        let total = stale.len();
        if let Some(callback) = progress {
            callback.on_refresh_start(self.is_source, &self.name, total);
        }

        let mut discrepancies = Vec::new();
        for (index, path_in_library) in stale.iter().enumerate() {
            if let Some(callback) = progress {
                callback.on_refresh_progress(
                    self.is_source,
                    &self.name,
                    index + 1,
                    total,
                    path_in_library,
                );
            }
            let entry = match self.media.get_mut(path_in_library) {
                Some(entry) => entry,
                None => continue,
            };
            match entry.checksums_match() {
                Ok(true) => {
                    if let Err(e) = entry.refresh_cache_record() {
                        log::warn!("failed to refresh {}: {}", path_in_library.display(), e);
                    }
                }
                Ok(false) => discrepancies.push(path_in_library.clone()),
                Err(e) => log::warn!(
                    "skipping refresh of {}: {}",
                    path_in_library.display(),
                    e
                ),
            }
        }
        discrepancies
    }

    /// Keys of this library absent from `other`. Used symmetrically for
    /// "what's new on source" and "what's orphaned on backup".
    pub fn media_not_present_in(&self, other: &Library) -> Vec<PathBuf> {
        self.media
            .keys()
            .filter(|key| !other.media.contains_key(*key))
            .cloned()
            .collect()
    }

    /// Copy every file present in `source` but missing here, verifying
    /// each copy against the source entry's real checksum. One bad file
    /// must not block the rest: per-file failures go to the
    /// `on_backup_error` callback and the batch continues. Returns the
    /// number of files copied.
    pub fn backup_new_media(
        &mut self,
        source: &mut Library,
        progress: Option<&dyn SyncProgress>,
    ) -> usize {
        let new_media = source.media_not_present_in(self);
        let total = new_media.len();
        if let Some(callback) = progress {
            callback.on_backup_start(&self.name, total);
        }

        let mut copied = 0;
        for (index, path_in_library) in new_media.iter().enumerate() {
            if let Some(callback) = progress {
                callback.on_backup_progress(&self.name, index + 1, total, path_in_library);
            }

            let (source_path, checksum) = match source.media.get_mut(path_in_library) {
                Some(entry) => match entry.real_checksum() {
                    Ok(checksum) => (entry.path().to_path_buf(), checksum),
                    Err(e) => {
                        log::warn!("cannot hash {}: {}", path_in_library.display(), e);
                        if let Some(callback) = progress {
                            callback.on_backup_error(&self.name, path_in_library, &e.to_string());
                        }
                        continue;
                    }
                },
                None => continue,
            };

            match self.copy_in(&source_path, path_in_library, &checksum) {
                Ok(()) => copied += 1,
                Err(e) => {
                    log::warn!("failed to back up {}: {}", path_in_library.display(), e);
                    if let Some(callback) = progress {
                        callback.on_backup_error(&self.name, path_in_library, &e.to_string());
                    }
                }
            }
        }
        copied
    }
}
