//! Checksum cache record I/O.
//!
//! Every media file gets a sidecar record stored under a `.cache`
//! subdirectory next to it, named `<media file name>.txt`. The record is a
//! single `|`-delimited line:
//!
//! ```text
//! date|checksum[|mtime|size]
//! ```
//!
//! `date` is the local calendar date (`YYYY-MM-DD`) the record was last
//! written; `checksum` is the lowercase hex digest of the file's content at
//! that time. The `mtime` (unix seconds) and `size` (bytes) fields are
//! advisory and never participate in equality checks. Records written by
//! this engine carry them when the file can be stat'd; records from older
//! versions have only the first two fields.

use crate::error::EngineError;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the sidecar directory, skipped by all media enumeration.
pub const CACHE_DIR_NAME: &str = ".cache";

/// One persisted checksum record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// Local date the record was last written.
    pub date: NaiveDate,
    /// Hex digest of the file content at the time of writing.
    pub checksum: String,
    /// Advisory modification time (unix seconds), informational only.
    pub mtime: Option<i64>,
    /// Advisory file size in bytes, informational only.
    pub size: Option<u64>,
}

impl CacheRecord {
    /// A record with only the required fields.
    pub fn new(date: NaiveDate, checksum: String) -> Self {
        CacheRecord {
            date,
            checksum,
            mtime: None,
            size: None,
        }
    }

    /// A record for `media_path`, capturing the advisory mtime/size fields
    /// when the file can be stat'd.
    pub fn for_file(media_path: &Path, checksum: String, date: NaiveDate) -> Self {
        let mut record = CacheRecord::new(date, checksum);
        if let Ok(metadata) = fs::metadata(media_path) {
            record.size = Some(metadata.len());
            record.mtime = metadata
                .modified()
                .ok()
                .map(|t| filetime::FileTime::from_system_time(t).unix_seconds());
        }
        record
    }

    /// Sidecar path for a media file:
    /// `<same directory>/.cache/<file name>.txt`.
    pub fn sidecar_path(media_path: &Path) -> PathBuf {
        let dir = media_path.parent().unwrap_or_else(|| Path::new(""));
        let name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        dir.join(CACHE_DIR_NAME).join(format!("{}.txt", name))
    }

    /// Write this record to `path`, truncating any prior content.
    ///
    /// When `overwrite` is false and the sidecar already exists, this is a
    /// no-op — an existing record is never silently clobbered.
    pub fn write(&self, path: &Path, overwrite: bool) -> Result<(), EngineError> {
        if !overwrite && path.exists() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let mut line = format!("{}|{}", self.date.format("%Y-%m-%d"), self.checksum);
        if let (Some(mtime), Some(size)) = (self.mtime, self.size) {
            line.push_str(&format!("|{}|{}", mtime, size));
        }

        log::debug!("writing cache record {}", path.display());
        fs::write(path, line).map_err(|e| EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Read and parse the record at `path`.
    ///
    /// Fails with `FileNotFound` when the sidecar does not exist (creating
    /// a missing record is the media entry's job, not this parser's), and
    /// with `MalformedCacheRecord` when the field count is outside 2–4 or
    /// a field does not parse.
    pub fn read(path: &Path) -> Result<CacheRecord, EngineError> {
        if !path.is_file() {
            return Err(EngineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let line = content.lines().next().unwrap_or("");
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();

        if fields.len() < 2 || fields.len() > 4 {
            return Err(EngineError::MalformedCacheRecord {
                path: path.to_path_buf(),
                reason: format!("expected 2-4 fields, found {}", fields.len()),
            });
        }

        let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").map_err(|_| {
            EngineError::MalformedCacheRecord {
                path: path.to_path_buf(),
                reason: format!("invalid date '{}'", fields[0]),
            }
        })?;

        let checksum = fields[1].to_string();
        if checksum.is_empty() {
            return Err(EngineError::MalformedCacheRecord {
                path: path.to_path_buf(),
                reason: "empty checksum field".to_string(),
            });
        }

        let mtime = match fields.get(2) {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                EngineError::MalformedCacheRecord {
                    path: path.to_path_buf(),
                    reason: format!("invalid mtime '{}'", raw),
                }
            })?),
            None => None,
        };

        let size = match fields.get(3) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                EngineError::MalformedCacheRecord {
                    path: path.to_path_buf(),
                    reason: format!("invalid size '{}'", raw),
                }
            })?),
            None => None,
        };

        Ok(CacheRecord {
            date,
            checksum,
            mtime,
            size,
        })
    }
}
