//! Mirror reconciliation engine.
//!
//! Orchestrates the source and backup mirrors to detect and resolve four
//! classes of drift: new source media, orphaned backup media, local
//! checksum discrepancies (real vs cached within one mirror), and mirror
//! checksum discrepancies (cached vs cached across mirrors).
//!
//! The engine is a plain value rebuilt each run from configuration. It
//! carries one piece of state: whether the mirrors have been loaded.
//! Nearly every operation requires "loaded" and fails fast otherwise.
//! Detection queries are read-only; the only fully automatic mutation is
//! `backup_new_source_media`, which can never destroy data. Everything
//! else that changes files takes an explicit per-item decision from the
//! caller.

use crate::checksum::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::library::Library;
use crate::media::MediaEntry;
use crate::mirror::Mirror;
use crate::progress::SyncProgress;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Configuration consumed by the engine. Owned by the caller (the
/// presentation layer reads it from wherever it likes).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    /// Ordered list of library names, identical across both mirrors.
    pub libraries: Vec<String>,
    /// Cache records older than this many days are re-verified.
    pub stale_after_days: i64,
    pub algorithm: ChecksumAlgorithm,
}

/// Identifies one media entry on one side of the mirror pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRef {
    pub is_source: bool,
    pub library: String,
    pub path_in_library: PathBuf,
}

/// Caller decision for a local checksum discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalResolution {
    /// The file is valid; rewrite its cache record from current content.
    AcceptLocal,
    /// The file is corrupt; replace it with the mirror counterpart.
    RestoreFromMirror,
    /// Leave the entry flagged.
    Skip,
}

/// Caller decision for a mirror checksum discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorResolution {
    /// The source copy is correct; overwrite the backup copy.
    SourceWins,
    /// The backup copy is correct; overwrite the source copy.
    BackupWins,
    /// Leave the pair flagged.
    Skip,
}

/// Caller decision for an orphaned backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanResolution {
    /// Delete the backup file.
    Delete,
    /// Copy the backup file back into the source mirror (the backup copy
    /// is kept).
    RestoreToSource,
    /// Leave the entry flagged.
    Skip,
}

/// Per-class drift counts across all configured libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftSummary {
    pub new_source_media: usize,
    pub orphan_backup_media: usize,
    pub stale_cache_media: usize,
    pub local_checksum_discrepancies: usize,
    pub mirror_checksum_discrepancies: usize,
    pub orphan_cache_files: usize,
    pub empty_directories: usize,
}

impl DriftSummary {
    pub fn total(&self) -> usize {
        self.automatic() + self.manual()
    }

    /// Problems the engine resolves without operator decisions.
    pub fn automatic(&self) -> usize {
        self.new_source_media
            + self.stale_cache_media
            + self.orphan_cache_files
            + self.empty_directories
    }

    /// Problems that require an explicit per-item decision.
    pub fn manual(&self) -> usize {
        self.orphan_backup_media
            + self.local_checksum_discrepancies
            + self.mirror_checksum_discrepancies
    }
}

/// Outcome of a `scan`/`full_scan` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// New source files copied to the backup mirror.
    pub backed_up: usize,
    /// Stale entries whose real and cached checksums disagreed. Left for
    /// operator review.
    pub discrepancies: Vec<MediaRef>,
    /// Orphan sidecar files removed.
    pub orphan_cache_files_removed: usize,
}

/// The reconciliation engine over one source and one backup mirror.
#[derive(Debug)]
pub struct SyncEngine {
    source: Mirror,
    backup: Mirror,
    libraries: Vec<String>,
    stale_after_days: i64,
    loaded: bool,
}

/// Look up a library by name, with a `LibraryNotFound` error carrying the
/// would-be path.
fn library_mut_or_err<'a>(
    mirror: &'a mut Mirror,
    name: &str,
) -> Result<&'a mut Library, EngineError> {
    let missing = EngineError::LibraryNotFound {
        path: mirror.root().join(name),
    };
    mirror.library_mut(name).ok_or(missing)
}

/// Look up a tracked entry, with a `MediaNotTracked` error otherwise.
fn entry_mut_or_err<'a>(
    library: &'a mut Library,
    path_in_library: &Path,
) -> Result<&'a mut MediaEntry, EngineError> {
    let untracked = EngineError::MediaNotTracked {
        library: library.name().to_string(),
        path_in_library: path_in_library.to_path_buf(),
    };
    library.entry_mut(path_in_library).ok_or(untracked)
}

/// Local discrepancies within one library: stale entries whose real
/// checksum disagrees with the cached one. Fresh caches are trusted
/// without re-hashing.
fn local_discrepancies_in(library: &mut Library, threshold_days: i64) -> Vec<PathBuf> {
    let stale = library.stale_media(threshold_days);
    let mut discrepancies = Vec::new();
    for path_in_library in stale {
        let entry = match library.entry_mut(&path_in_library) {
            Some(entry) => entry,
            None => continue,
        };
        match entry.checksums_match() {
            Ok(false) => discrepancies.push(path_in_library),
            Ok(true) => {}
            Err(e) => log::warn!(
                "skipping checksum verification for {}: {}",
                path_in_library.display(),
                e
            ),
        }
    }
    discrepancies
}

impl SyncEngine {
    /// Build an engine from configuration. Both mirror roots must exist.
    pub fn new(config: SyncConfig) -> Result<Self, EngineError> {
        let source = Mirror::source(config.source_root, config.algorithm)?;
        let backup = Mirror::backup(config.backup_root, config.algorithm)?;
        Ok(SyncEngine {
            source,
            backup,
            libraries: config.libraries,
            stale_after_days: config.stale_after_days,
            loaded: false,
        })
    }

    pub fn source_mirror(&self) -> &Mirror {
        &self.source
    }

    pub fn backup_mirror(&self) -> &Mirror {
        &self.backup
    }

    pub fn library_names(&self) -> &[String] {
        &self.libraries
    }

    pub fn stale_after_days(&self) -> i64 {
        self.stale_after_days
    }

    fn require_loaded(&self) -> Result<(), EngineError> {
        if self.loaded {
            Ok(())
        } else {
            Err(EngineError::MirrorsNotLoaded)
        }
    }

    /// Register every configured library on both mirrors. Re-run to pick
    /// up newly created library directories.
    pub fn load_mirrors(&mut self) -> Result<(), EngineError> {
        for name in &self.libraries {
            self.source.load_library(name)?;
        }
        for name in &self.libraries {
            self.backup.load_library(name)?;
        }
        self.loaded = true;
        log::info!("loaded {} libraries on both mirrors", self.libraries.len());
        Ok(())
    }

    /// Rebuild every library's media index from disk. Re-run to pick up
    /// filesystem changes.
    pub fn load_libraries(
        &mut self,
        progress: Option<&dyn SyncProgress>,
    ) -> Result<(), EngineError> {
        self.require_loaded()?;
        for name in &self.libraries {
            if let Some(library) = self.source.library_mut(name) {
                library.load_all(progress)?;
            }
            if let Some(library) = self.backup.library_mut(name) {
                library.load_all(progress)?;
            }
        }
        Ok(())
    }

    /// Files present on source but missing from backup, per library.
    pub fn new_source_media(&self) -> Result<Vec<(String, PathBuf)>, EngineError> {
        self.require_loaded()?;
        let mut result = Vec::new();
        for name in &self.libraries {
            let source_lib = match self.source.library(name) {
                Some(library) => library,
                None => continue,
            };
            let backup_lib = match self.backup.library(name) {
                Some(library) => library,
                None => continue,
            };
            for path in source_lib.media_not_present_in(backup_lib) {
                result.push((name.clone(), path));
            }
        }
        Ok(result)
    }

    /// Files present on backup but missing from source, per library.
    pub fn orphan_backup_media(&self) -> Result<Vec<(String, PathBuf)>, EngineError> {
        self.require_loaded()?;
        let mut result = Vec::new();
        for name in &self.libraries {
            let source_lib = match self.source.library(name) {
                Some(library) => library,
                None => continue,
            };
            let backup_lib = match self.backup.library(name) {
                Some(library) => library,
                None => continue,
            };
            for path in backup_lib.media_not_present_in(source_lib) {
                result.push((name.clone(), path));
            }
        }
        Ok(result)
    }

    /// Entries on either mirror whose cache record is older than the
    /// configured threshold.
    pub fn stale_cache_media(&mut self) -> Result<Vec<MediaRef>, EngineError> {
        self.require_loaded()?;
        let threshold = self.stale_after_days;
        let mut result = Vec::new();
        for name in &self.libraries {
            if let Some(library) = self.source.library_mut(name) {
                for path in library.stale_media(threshold) {
                    result.push(MediaRef {
                        is_source: true,
                        library: name.clone(),
                        path_in_library: path,
                    });
                }
            }
            if let Some(library) = self.backup.library_mut(name) {
                for path in library.stale_media(threshold) {
                    result.push(MediaRef {
                        is_source: false,
                        library: name.clone(),
                        path_in_library: path,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Stale entries on either mirror whose real checksum disagrees with
    /// the cached one. Entries with fresh caches are never re-hashed —
    /// the cost/correctness trade-off of trusting fresh records.
    pub fn local_checksum_discrepancies(&mut self) -> Result<Vec<MediaRef>, EngineError> {
        self.require_loaded()?;
        let threshold = self.stale_after_days;
        let mut result = Vec::new();
        for name in &self.libraries {
            if let Some(library) = self.source.library_mut(name) {
                for path in local_discrepancies_in(library, threshold) {
                    result.push(MediaRef {
                        is_source: true,
                        library: name.clone(),
                        path_in_library: path,
                    });
                }
            }
            if let Some(library) = self.backup.library_mut(name) {
                for path in local_discrepancies_in(library, threshold) {
                    result.push(MediaRef {
                        is_source: false,
                        library: name.clone(),
                        path_in_library: path,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Paths present in both mirrors whose cached checksums disagree.
    ///
    /// Checked from the source side only: the comparison is symmetric
    /// over the same pair, so a mismatch cannot exist "only" on backup
    /// once both entries exist.
    pub fn mirror_checksum_discrepancies(&mut self) -> Result<Vec<(String, PathBuf)>, EngineError> {
        self.require_loaded()?;
        let mut result = Vec::new();
        for name in &self.libraries {
            let source_lib = match self.source.library_mut(name) {
                Some(library) => library,
                None => continue,
            };
            let backup_lib = match self.backup.library_mut(name) {
                Some(library) => library,
                None => continue,
            };

            let paths: Vec<PathBuf> = source_lib.media().keys().cloned().collect();
            for path in paths {
                if !backup_lib.contains(&path) {
                    continue;
                }
                let source_cached = match source_lib
                    .entry_mut(&path)
                    .map(|entry| entry.cached_checksum())
                {
                    Some(Ok(checksum)) => checksum,
                    Some(Err(e)) => {
                        log::warn!("skipping {}: {}", path.display(), e);
                        continue;
                    }
                    None => continue,
                };
                let backup_cached = match backup_lib
                    .entry_mut(&path)
                    .map(|entry| entry.cached_checksum())
                {
                    Some(Ok(checksum)) => checksum,
                    Some(Err(e)) => {
                        log::warn!("skipping {}: {}", path.display(), e);
                        continue;
                    }
                    None => continue,
                };
                if source_cached != backup_cached {
                    result.push((name.clone(), path));
                }
            }
        }
        Ok(result)
    }

    /// Empty directories across all libraries on both mirrors.
    pub fn empty_directories(&self) -> Result<Vec<PathBuf>, EngineError> {
        self.require_loaded()?;
        let mut result = Vec::new();
        for mirror in [&self.source, &self.backup] {
            for library in mirror.libraries().values() {
                result.extend(library.empty_directories()?);
            }
        }
        Ok(result)
    }

    /// Orphan sidecar files across all libraries on both mirrors.
    pub fn orphan_cache_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        self.require_loaded()?;
        let mut result = Vec::new();
        for mirror in [&self.source, &self.backup] {
            for library in mirror.libraries().values() {
                result.extend(library.orphan_cache_files()?);
            }
        }
        Ok(result)
    }

    /// Count every drift class in one pass. Local-discrepancy counting
    /// re-hashes stale entries, so this can be slow on a cold cache.
    pub fn drift_summary(&mut self) -> Result<DriftSummary, EngineError> {
        self.require_loaded()?;
        Ok(DriftSummary {
            new_source_media: self.new_source_media()?.len(),
            orphan_backup_media: self.orphan_backup_media()?.len(),
            stale_cache_media: self.stale_cache_media()?.len(),
            local_checksum_discrepancies: self.local_checksum_discrepancies()?.len(),
            mirror_checksum_discrepancies: self.mirror_checksum_discrepancies()?.len(),
            orphan_cache_files: self.orphan_cache_files()?.len(),
            empty_directories: self.empty_directories()?.len(),
        })
    }

    /// Copy every new source file to the backup mirror. The only fully
    /// automatic mutation: creating new backup copies can never destroy
    /// data. Returns the number of files copied.
    pub fn backup_new_source_media(
        &mut self,
        progress: Option<&dyn SyncProgress>,
    ) -> Result<usize, EngineError> {
        self.require_loaded()?;
        let mut copied = 0;
        for name in &self.libraries {
            let source_lib = match self.source.library_mut(name) {
                Some(library) => library,
                None => continue,
            };
            let backup_lib = match self.backup.library_mut(name) {
                Some(library) => library,
                None => continue,
            };
            copied += backup_lib.backup_new_media(source_lib, progress);
        }
        Ok(copied)
    }

    /// Re-verify stale cache records on both mirrors. Matching entries
    /// get refreshed records; mismatches are returned for review.
    pub fn refresh_stale_cache_files(
        &mut self,
        threshold_days: i64,
        progress: Option<&dyn SyncProgress>,
    ) -> Result<Vec<MediaRef>, EngineError> {
        self.require_loaded()?;
        let mut discrepancies = Vec::new();
        for name in &self.libraries {
            if let Some(library) = self.source.library_mut(name) {
                for path in library.refresh_stale(threshold_days, progress) {
                    discrepancies.push(MediaRef {
                        is_source: true,
                        library: name.clone(),
                        path_in_library: path,
                    });
                }
            }
            if let Some(library) = self.backup.library_mut(name) {
                for path in library.refresh_stale(threshold_days, progress) {
                    discrepancies.push(MediaRef {
                        is_source: false,
                        library: name.clone(),
                        path_in_library: path,
                    });
                }
            }
        }
        Ok(discrepancies)
    }

    /// Remove orphan sidecar files on both mirrors.
    pub fn delete_orphan_cache_files(&mut self) -> Result<Vec<PathBuf>, EngineError> {
        self.require_loaded()?;
        let mut removed = Vec::new();
        for mirror in [&self.source, &self.backup] {
            for library in mirror.libraries().values() {
                removed.extend(library.delete_orphan_cache_files()?);
            }
        }
        Ok(removed)
    }

    /// Remove empty directories on both mirrors.
    pub fn delete_empty_directories(&mut self) -> Result<Vec<PathBuf>, EngineError> {
        self.require_loaded()?;
        let mut removed = Vec::new();
        for mirror in [&self.source, &self.backup] {
            for library in mirror.libraries().values() {
                removed.extend(library.delete_empty_directories()?);
            }
        }
        Ok(removed)
    }

    /// Apply the caller's decision for one local checksum discrepancy.
    pub fn resolve_local_discrepancy(
        &mut self,
        target: &MediaRef,
        choice: LocalResolution,
    ) -> Result<(), EngineError> {
        self.require_loaded()?;
        match choice {
            LocalResolution::Skip => Ok(()),
            LocalResolution::AcceptLocal => {
                let mirror = if target.is_source {
                    &mut self.source
                } else {
                    &mut self.backup
                };
                let library = library_mut_or_err(mirror, &target.library)?;
                let entry = entry_mut_or_err(library, &target.path_in_library)?;
                entry.overwrite_cache_record()
            }
            LocalResolution::RestoreFromMirror => {
                let (target_mirror, other_mirror) = if target.is_source {
                    (&mut self.source, &mut self.backup)
                } else {
                    (&mut self.backup, &mut self.source)
                };

                let other_library = library_mut_or_err(other_mirror, &target.library)?;
                // Only possible when the counterpart actually exists
                let counterpart_missing = EngineError::FileNotFound {
                    path: other_library.root().join(&target.path_in_library),
                };
                let counterpart = other_library
                    .entry_mut(&target.path_in_library)
                    .ok_or(counterpart_missing)?;
                let checksum = counterpart.real_checksum()?;
                let counterpart_path = counterpart.path().to_path_buf();

                let target_library = library_mut_or_err(target_mirror, &target.library)?;
                target_library.delete(&target.path_in_library)?;
                target_library.copy_in(&counterpart_path, &target.path_in_library, &checksum)
            }
        }
    }

    /// Apply the caller's decision for one mirror checksum discrepancy.
    ///
    /// Fails with `UnresolvedLocalDiscrepancies` while any local
    /// discrepancy exists on either mirror: mirror comparison trusts
    /// cached checksums, so local discrepancies must be cleared first.
    pub fn resolve_mirror_discrepancy(
        &mut self,
        library: &str,
        path_in_library: &Path,
        choice: MirrorResolution,
    ) -> Result<(), EngineError> {
        self.require_loaded()?;
        let locals = self.local_checksum_discrepancies()?;
        if !locals.is_empty() {
            return Err(EngineError::UnresolvedLocalDiscrepancies {
                count: locals.len(),
            });
        }

        let from_source = match choice {
            MirrorResolution::Skip => return Ok(()),
            MirrorResolution::SourceWins => true,
            MirrorResolution::BackupWins => false,
        };

        let (good_mirror, bad_mirror) = if from_source {
            (&mut self.source, &mut self.backup)
        } else {
            (&mut self.backup, &mut self.source)
        };

        let good_library = library_mut_or_err(good_mirror, library)?;
        let good_entry = entry_mut_or_err(good_library, path_in_library)?;
        let checksum = good_entry.real_checksum()?;
        let good_path = good_entry.path().to_path_buf();

        let bad_library = library_mut_or_err(bad_mirror, library)?;
        bad_library.delete(path_in_library)?;
        bad_library.copy_in(&good_path, path_in_library, &checksum)
    }

    /// Apply the caller's decision for one orphaned backup file.
    pub fn resolve_orphan_backup_media(
        &mut self,
        library: &str,
        path_in_library: &Path,
        choice: OrphanResolution,
    ) -> Result<(), EngineError> {
        self.require_loaded()?;
        match choice {
            OrphanResolution::Skip => Ok(()),
            OrphanResolution::Delete => {
                let backup_library = library_mut_or_err(&mut self.backup, library)?;
                backup_library.delete(path_in_library)
            }
            OrphanResolution::RestoreToSource => {
                let backup_library = library_mut_or_err(&mut self.backup, library)?;
                let entry = entry_mut_or_err(backup_library, path_in_library)?;
                let checksum = entry.real_checksum()?;
                let backup_path = entry.path().to_path_buf();

                let source_library = library_mut_or_err(&mut self.source, library)?;
                // The backup copy stays; restoration only adds
                source_library.copy_in(&backup_path, path_in_library, &checksum)
            }
        }
    }

    /// Back up new source media only.
    pub fn quick_scan(
        &mut self,
        progress: Option<&dyn SyncProgress>,
    ) -> Result<usize, EngineError> {
        self.backup_new_source_media(progress)
    }

    /// Back up new media, re-verify stale records at the configured
    /// threshold, and drop orphan sidecars.
    pub fn scan(&mut self, progress: Option<&dyn SyncProgress>) -> Result<ScanReport, EngineError> {
        let threshold = self.stale_after_days;
        self.scan_with_threshold(threshold, progress)
    }

    /// Like `scan`, but re-verifies every cache record regardless of age.
    pub fn full_scan(
        &mut self,
        progress: Option<&dyn SyncProgress>,
    ) -> Result<ScanReport, EngineError> {
        self.scan_with_threshold(-1, progress)
    }

    fn scan_with_threshold(
        &mut self,
        threshold_days: i64,
        progress: Option<&dyn SyncProgress>,
    ) -> Result<ScanReport, EngineError> {
        let backed_up = self.backup_new_source_media(progress)?;
        let discrepancies = self.refresh_stale_cache_files(threshold_days, progress)?;
        let removed = self.delete_orphan_cache_files()?;
        Ok(ScanReport {
            backed_up,
            discrepancies,
            orphan_cache_files_removed: removed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRecord;
    use crate::checksum::compute_file_checksum;
    use chrono::{Duration, Local};
    use std::fs;
    use std::io::Write;

    struct Sandbox {
        dir: tempfile::TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            fs::create_dir_all(dir.path().join("source/Videos"))
                .expect("Failed to create source library");
            fs::create_dir_all(dir.path().join("backup/Videos"))
                .expect("Failed to create backup library");
            Sandbox { dir }
        }

        fn config(&self, stale_after_days: i64) -> SyncConfig {
            SyncConfig {
                source_root: self.dir.path().join("source"),
                backup_root: self.dir.path().join("backup"),
                libraries: vec!["Videos".to_string()],
                stale_after_days,
                algorithm: ChecksumAlgorithm::Sha1,
            }
        }

        fn engine(&self, stale_after_days: i64) -> SyncEngine {
            let mut engine =
                SyncEngine::new(self.config(stale_after_days)).expect("Failed to create engine");
            engine.load_mirrors().expect("Failed to load mirrors");
            engine
                .load_libraries(None)
                .expect("Failed to load libraries");
            engine
        }

        fn write_media(&self, mirror: &str, rel: &str, content: &[u8]) -> std::path::PathBuf {
            let path = self.dir.path().join(mirror).join("Videos").join(rel);
            fs::create_dir_all(path.parent().unwrap()).expect("Failed to create parent dirs");
            let mut file = fs::File::create(&path).expect("Failed to create media file");
            file.write_all(content).expect("Failed to write media file");
            path
        }
    }

    fn sha1_of(path: &Path) -> String {
        compute_file_checksum(path, ChecksumAlgorithm::Sha1).expect("Failed to hash file")
    }

    #[test]
    fn test_operations_require_loaded_mirrors() {
        let sandbox = Sandbox::new();
        let mut engine =
            SyncEngine::new(sandbox.config(90)).expect("Failed to create engine");

        assert!(matches!(
            engine.new_source_media(),
            Err(EngineError::MirrorsNotLoaded)
        ));
        assert!(matches!(
            engine.backup_new_source_media(None),
            Err(EngineError::MirrorsNotLoaded)
        ));
        assert!(matches!(
            engine.drift_summary(),
            Err(EngineError::MirrorsNotLoaded)
        ));
    }

    #[test]
    fn test_load_mirrors_requires_source_library_directory() {
        let sandbox = Sandbox::new();
        let mut config = sandbox.config(90);
        config.libraries.push("Music".to_string());

        let mut engine = SyncEngine::new(config).expect("Failed to create engine");
        // Music does not exist on source; backup would provision it
        let result = engine.load_mirrors();
        assert!(matches!(result, Err(EngineError::LibraryNotFound { .. })));
    }

    #[test]
    fn test_backup_mirror_provisions_library_directories() {
        let sandbox = Sandbox::new();
        fs::create_dir_all(sandbox.dir.path().join("source/Music"))
            .expect("Failed to create source library");
        fs::remove_dir_all(sandbox.dir.path().join("backup/Videos"))
            .expect("Failed to remove backup library");

        let mut config = sandbox.config(90);
        config.libraries.push("Music".to_string());

        let mut engine = SyncEngine::new(config).expect("Failed to create engine");
        engine.load_mirrors().expect("Failed to load mirrors");

        assert!(sandbox.dir.path().join("backup/Videos").is_dir());
        assert!(sandbox.dir.path().join("backup/Music").is_dir());
    }

    #[test]
    fn test_drift_classification() {
        let sandbox = Sandbox::new();
        sandbox.write_media("source", "x.mkv", b"x bits");
        sandbox.write_media("source", "y.mkv", b"y bits");
        sandbox.write_media("backup", "y.mkv", b"y bits");
        sandbox.write_media("backup", "z.mkv", b"z bits");

        let engine = sandbox.engine(90);

        assert_eq!(
            engine.new_source_media().expect("Query failed"),
            vec![("Videos".to_string(), PathBuf::from("x.mkv"))]
        );
        assert_eq!(
            engine.orphan_backup_media().expect("Query failed"),
            vec![("Videos".to_string(), PathBuf::from("z.mkv"))]
        );
    }

    #[test]
    fn test_backup_new_source_media() {
        let sandbox = Sandbox::new();
        let source_path = sandbox.write_media("source", "nested/x.mkv", b"x bits");
        sandbox.write_media("source", "y.mkv", b"y bits");
        sandbox.write_media("backup", "y.mkv", b"y bits");

        let mut engine = sandbox.engine(90);
        let copied = engine
            .backup_new_source_media(None)
            .expect("Backup run failed");

        assert_eq!(copied, 1);
        let backup_path = sandbox.dir.path().join("backup/Videos/nested/x.mkv");
        assert!(backup_path.is_file());
        assert_eq!(sha1_of(&backup_path), sha1_of(&source_path));
        // The copy got a fresh cache record
        let record = CacheRecord::read(&CacheRecord::sidecar_path(&backup_path))
            .expect("Failed to read record");
        assert_eq!(record.checksum, sha1_of(&backup_path));
        // Nothing left to back up
        assert!(engine.new_source_media().expect("Query failed").is_empty());
    }

    #[test]
    fn test_mirror_discrepancy_detection_and_resolution() {
        let sandbox = Sandbox::new();
        let source_path = sandbox.write_media("source", "y.mkv", b"source bits");
        let backup_path = sandbox.write_media("backup", "y.mkv", b"backup bits");

        let mut engine = sandbox.engine(90);

        // Sidecars self-heal on first read, capturing the differing content
        let flagged = engine
            .mirror_checksum_discrepancies()
            .expect("Query failed");
        assert_eq!(
            flagged,
            vec![("Videos".to_string(), PathBuf::from("y.mkv"))]
        );

        let source_checksum = sha1_of(&source_path);
        engine
            .resolve_mirror_discrepancy(
                "Videos",
                Path::new("y.mkv"),
                MirrorResolution::SourceWins,
            )
            .expect("Resolution failed");

        // Backup now carries the source content, really and per its record
        assert_eq!(sha1_of(&backup_path), source_checksum);
        let record = CacheRecord::read(&CacheRecord::sidecar_path(&backup_path))
            .expect("Failed to read record");
        assert_eq!(record.checksum, source_checksum);
        // Source unchanged
        assert_eq!(sha1_of(&source_path), source_checksum);
        assert!(engine
            .mirror_checksum_discrepancies()
            .expect("Query failed")
            .is_empty());
    }

    #[test]
    fn test_mirror_resolution_gated_on_local_discrepancies() {
        let sandbox = Sandbox::new();
        let source_path = sandbox.write_media("source", "y.mkv", b"y bits");
        sandbox.write_media("backup", "y.mkv", b"y bits");

        // Stale record with a checksum that no longer matches the file
        let old = Local::now().date_naive() - Duration::days(120);
        CacheRecord::new(old, "checksum-from-before-corruption".to_string())
            .write(&CacheRecord::sidecar_path(&source_path), true)
            .expect("Failed to write record");

        let mut engine = sandbox.engine(90);
        let result = engine.resolve_mirror_discrepancy(
            "Videos",
            Path::new("y.mkv"),
            MirrorResolution::SourceWins,
        );
        assert!(matches!(
            result,
            Err(EngineError::UnresolvedLocalDiscrepancies { count: 1 })
        ));
    }

    #[test]
    fn test_local_discrepancy_detection_skips_fresh_caches() {
        let sandbox = Sandbox::new();
        let fresh = sandbox.write_media("source", "fresh.mkv", b"fresh bits");
        let stale = sandbox.write_media("source", "stale.mkv", b"stale bits");

        // Both records are wrong, but only the stale one is ever checked
        let today = Local::now().date_naive();
        CacheRecord::new(today, "wrong-but-fresh".to_string())
            .write(&CacheRecord::sidecar_path(&fresh), true)
            .expect("Failed to write record");
        CacheRecord::new(today - Duration::days(120), "wrong-and-stale".to_string())
            .write(&CacheRecord::sidecar_path(&stale), true)
            .expect("Failed to write record");

        let mut engine = sandbox.engine(90);
        let discrepancies = engine
            .local_checksum_discrepancies()
            .expect("Query failed");
        assert_eq!(
            discrepancies,
            vec![MediaRef {
                is_source: true,
                library: "Videos".to_string(),
                path_in_library: PathBuf::from("stale.mkv"),
            }]
        );
    }

    #[test]
    fn test_resolve_local_discrepancy_accept_local() {
        let sandbox = Sandbox::new();
        let source_path = sandbox.write_media("source", "y.mkv", b"y bits");
        let old = Local::now().date_naive() - Duration::days(120);
        CacheRecord::new(old, "outdated-checksum".to_string())
            .write(&CacheRecord::sidecar_path(&source_path), true)
            .expect("Failed to write record");

        let mut engine = sandbox.engine(90);
        let target = MediaRef {
            is_source: true,
            library: "Videos".to_string(),
            path_in_library: PathBuf::from("y.mkv"),
        };
        engine
            .resolve_local_discrepancy(&target, LocalResolution::AcceptLocal)
            .expect("Resolution failed");

        let record = CacheRecord::read(&CacheRecord::sidecar_path(&source_path))
            .expect("Failed to read record");
        assert_eq!(record.checksum, sha1_of(&source_path));
        assert_eq!(record.date, Local::now().date_naive());
        assert!(engine
            .local_checksum_discrepancies()
            .expect("Query failed")
            .is_empty());
    }

    #[test]
    fn test_resolve_local_discrepancy_restore_from_mirror() {
        let sandbox = Sandbox::new();
        let source_path = sandbox.write_media("source", "y.mkv", b"corrupt bits");
        let backup_path = sandbox.write_media("backup", "y.mkv", b"good bits");

        // The record remembers the uncorrupted content
        let old = Local::now().date_naive() - Duration::days(120);
        CacheRecord::new(old, sha1_of(&backup_path))
            .write(&CacheRecord::sidecar_path(&source_path), true)
            .expect("Failed to write record");

        let mut engine = sandbox.engine(90);
        let target = MediaRef {
            is_source: true,
            library: "Videos".to_string(),
            path_in_library: PathBuf::from("y.mkv"),
        };
        engine
            .resolve_local_discrepancy(&target, LocalResolution::RestoreFromMirror)
            .expect("Resolution failed");

        assert_eq!(
            fs::read(&source_path).expect("Failed to read restored file"),
            b"good bits"
        );
        assert_eq!(sha1_of(&source_path), sha1_of(&backup_path));
    }

    #[test]
    fn test_restore_from_mirror_requires_counterpart() {
        let sandbox = Sandbox::new();
        sandbox.write_media("source", "only-here.mkv", b"bits");

        let mut engine = sandbox.engine(90);
        let target = MediaRef {
            is_source: true,
            library: "Videos".to_string(),
            path_in_library: PathBuf::from("only-here.mkv"),
        };
        let result = engine.resolve_local_discrepancy(&target, LocalResolution::RestoreFromMirror);
        assert!(matches!(result, Err(EngineError::FileNotFound { .. })));
        // The flagged file was not touched
        assert!(sandbox
            .dir
            .path()
            .join("source/Videos/only-here.mkv")
            .is_file());
    }

    #[test]
    fn test_resolve_orphan_backup_delete() {
        let sandbox = Sandbox::new();
        let backup_path = sandbox.write_media("backup", "z.mkv", b"z bits");

        let mut engine = sandbox.engine(90);
        engine
            .resolve_orphan_backup_media("Videos", Path::new("z.mkv"), OrphanResolution::Delete)
            .expect("Resolution failed");

        assert!(!backup_path.exists());
        assert!(engine
            .orphan_backup_media()
            .expect("Query failed")
            .is_empty());
    }

    #[test]
    fn test_resolve_orphan_backup_restore_to_source() {
        let sandbox = Sandbox::new();
        let backup_path = sandbox.write_media("backup", "z.mkv", b"z bits");

        let mut engine = sandbox.engine(90);
        engine
            .resolve_orphan_backup_media(
                "Videos",
                Path::new("z.mkv"),
                OrphanResolution::RestoreToSource,
            )
            .expect("Resolution failed");

        let source_path = sandbox.dir.path().join("source/Videos/z.mkv");
        assert!(source_path.is_file());
        assert_eq!(sha1_of(&source_path), sha1_of(&backup_path));
        // Restore does not delete the backup copy
        assert!(backup_path.exists());
    }

    #[test]
    fn test_skip_choices_change_nothing() {
        let sandbox = Sandbox::new();
        let backup_path = sandbox.write_media("backup", "z.mkv", b"z bits");

        let mut engine = sandbox.engine(90);
        engine
            .resolve_orphan_backup_media("Videos", Path::new("z.mkv"), OrphanResolution::Skip)
            .expect("Skip failed");
        assert!(backup_path.exists());
        assert_eq!(
            engine.orphan_backup_media().expect("Query failed").len(),
            1
        );
    }

    #[test]
    fn test_scan_report() {
        let sandbox = Sandbox::new();
        sandbox.write_media("source", "new.mkv", b"new bits");
        // Orphan sidecar on the backup side
        let orphan = sandbox
            .dir
            .path()
            .join("backup/Videos/.cache/gone.mkv.txt");
        fs::create_dir_all(orphan.parent().unwrap()).expect("Failed to create .cache dir");
        fs::write(&orphan, "2024-01-01|abc").expect("Failed to write orphan sidecar");

        let mut engine = sandbox.engine(90);
        let report = engine.scan(None).expect("Scan failed");

        assert_eq!(report.backed_up, 1);
        assert!(report.discrepancies.is_empty());
        assert_eq!(report.orphan_cache_files_removed, 1);
        assert!(!orphan.exists());
    }

    #[test]
    fn test_full_scan_reverifies_fresh_records() {
        let sandbox = Sandbox::new();
        let path = sandbox.write_media("source", "y.mkv", b"y bits");
        // Fresh but wrong record: a regular scan trusts it, a full scan
        // re-hashes and flags it
        CacheRecord::new(Local::now().date_naive(), "wrong".to_string())
            .write(&CacheRecord::sidecar_path(&path), true)
            .expect("Failed to write record");

        let mut engine = sandbox.engine(90);
        let regular = engine.scan(None).expect("Scan failed");
        assert!(regular.discrepancies.is_empty());

        let full = engine.full_scan(None).expect("Full scan failed");
        assert_eq!(
            full.discrepancies,
            vec![MediaRef {
                is_source: true,
                library: "Videos".to_string(),
                path_in_library: PathBuf::from("y.mkv"),
            }]
        );
    }

    #[test]
    fn test_drift_summary_counts() {
        let sandbox = Sandbox::new();
        sandbox.write_media("source", "x.mkv", b"x bits");
        sandbox.write_media("backup", "z.mkv", b"z bits");
        fs::create_dir_all(sandbox.dir.path().join("source/Videos/empty/nested"))
            .expect("Failed to create empty dirs");

        let mut engine = sandbox.engine(90);
        let summary = engine.drift_summary().expect("Summary failed");

        assert_eq!(summary.new_source_media, 1);
        assert_eq!(summary.orphan_backup_media, 1);
        assert_eq!(summary.empty_directories, 1); // only the innermost is empty
        assert_eq!(summary.manual(), 1);
        assert_eq!(summary.total(), summary.automatic() + summary.manual());
    }
}
