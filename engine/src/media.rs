//! In-memory representation of one tracked media file.
//!
//! A `MediaEntry` carries two lazily populated values: the real checksum
//! (hashed from file content, at most once per entry instance) and the
//! cached checksum record (loaded from the sidecar file, created on first
//! read if missing). Both memo cells are explicit `Option`s so the
//! computed/not-yet-computed distinction stays visible; construct a new
//! entry to force recomputation.

use crate::cache::CacheRecord;
use crate::checksum::{self, ChecksumAlgorithm};
use crate::error::EngineError;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};

/// One tracked file in a library.
#[derive(Debug, Clone)]
pub struct MediaEntry {
    name: String,
    extension: String,
    is_source: bool,
    path: PathBuf,
    path_in_library: PathBuf,
    sidecar_path: PathBuf,
    algorithm: ChecksumAlgorithm,
    real_checksum: Option<String>,
    cache_record: Option<CacheRecord>,
}

impl MediaEntry {
    /// Create an entry for the file at `path`, tracked under
    /// `path_in_library` relative to its library root.
    pub fn new(
        path: PathBuf,
        path_in_library: PathBuf,
        is_source: bool,
        algorithm: ChecksumAlgorithm,
    ) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let sidecar_path = CacheRecord::sidecar_path(&path);

        MediaEntry {
            name,
            extension,
            is_source,
            path,
            path_in_library,
            sidecar_path,
            algorithm,
            real_checksum: None,
            cache_record: None,
        }
    }

    /// File name including extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased extension without the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Which mirror this entry belongs to. Immutable once constructed.
    pub fn is_source(&self) -> bool {
        self.is_source
    }

    /// Absolute path of the media file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the library root — the identity key used to
    /// match files across mirrors.
    pub fn path_in_library(&self) -> &Path {
        &self.path_in_library
    }

    /// Path of the sidecar cache record.
    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    /// Checksum computed from the file's current content. Hashed on first
    /// access and memoized for the lifetime of this entry.
    pub fn real_checksum(&mut self) -> Result<String, EngineError> {
        if let Some(ref hex) = self.real_checksum {
            return Ok(hex.clone());
        }
        let hex = checksum::compute_file_checksum(&self.path, self.algorithm)?;
        self.real_checksum = Some(hex.clone());
        Ok(hex)
    }

    /// Load the sidecar record, creating it from the current real
    /// checksum when missing (trust on first read).
    fn load_cache_record(&mut self) -> Result<(), EngineError> {
        if self.cache_record.is_some() {
            return Ok(());
        }

        if !self.sidecar_path.is_file() {
            log::debug!(
                "no cache record for {}, creating from current content",
                self.path.display()
            );
            let checksum = self.real_checksum()?;
            let record = CacheRecord::for_file(&self.path, checksum, Local::now().date_naive());
            record.write(&self.sidecar_path, false)?;
        }

        self.cache_record = Some(CacheRecord::read(&self.sidecar_path)?);
        Ok(())
    }

    /// Checksum stored in the sidecar record.
    pub fn cached_checksum(&mut self) -> Result<String, EngineError> {
        self.load_cache_record()?;
        match self.cache_record {
            Some(ref record) => Ok(record.checksum.clone()),
            None => Err(EngineError::FileNotFound {
                path: self.sidecar_path.clone(),
            }),
        }
    }

    /// Date the sidecar record was last written.
    pub fn cached_date(&mut self) -> Result<NaiveDate, EngineError> {
        self.load_cache_record()?;
        match self.cache_record {
            Some(ref record) => Ok(record.date),
            None => Err(EngineError::FileNotFound {
                path: self.sidecar_path.clone(),
            }),
        }
    }

    /// True when the record is older than `threshold_days`:
    /// `today − cached_date > threshold_days`, strict. A negative
    /// threshold is always stale, which drives full rescans.
    pub fn cache_is_stale(&mut self, threshold_days: i64) -> Result<bool, EngineError> {
        let cached = self.cached_date()?;
        let today = Local::now().date_naive();
        Ok((today - cached).num_days() > threshold_days)
    }

    /// True when the real checksum equals the cached checksum.
    pub fn checksums_match(&mut self) -> Result<bool, EngineError> {
        let real = self.real_checksum()?;
        let cached = self.cached_checksum()?;
        Ok(real == cached)
    }

    /// Rewrite the sidecar record with the current real checksum and
    /// today's date — but only when the checksums still match. Refreshing
    /// a record for a file whose content silently changed would hide
    /// corruption, so that case fails with `ChecksumMismatch`.
    pub fn refresh_cache_record(&mut self) -> Result<(), EngineError> {
        let real = self.real_checksum()?;
        let cached = self.cached_checksum()?;
        if real != cached {
            return Err(EngineError::ChecksumMismatch {
                path: self.path.clone(),
                expected: cached,
                actual: real,
            });
        }

        let record = CacheRecord::for_file(&self.path, real, Local::now().date_naive());
        record.write(&self.sidecar_path, true)?;
        self.cache_record = Some(record);
        Ok(())
    }

    /// Unconditionally rewrite the sidecar record from the current file
    /// content. Used when an operator has reviewed a discrepancy and
    /// declared the file valid.
    pub fn overwrite_cache_record(&mut self) -> Result<(), EngineError> {
        let real = self.real_checksum()?;
        log::info!("accepting current content of {}", self.path.display());
        let record = CacheRecord::for_file(&self.path, real, Local::now().date_naive());
        record.write(&self.sidecar_path, true)?;
        self.cache_record = Some(record);
        Ok(())
    }
}
