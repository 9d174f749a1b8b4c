//! One half of a mirror pair: a root directory containing one
//! subdirectory per configured library name.
//!
//! The source/backup asymmetry encodes the policy "source data is never
//! fabricated; backup storage is provisioned as needed": a source mirror
//! requires every configured library directory to pre-exist, while a
//! backup mirror creates missing library directories on demand.

use crate::checksum::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::library::Library;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A mirror root with its named libraries.
#[derive(Debug)]
pub struct Mirror {
    root: PathBuf,
    is_source: bool,
    algorithm: ChecksumAlgorithm,
    libraries: BTreeMap<String, Library>,
}

impl Mirror {
    fn new(
        root: PathBuf,
        is_source: bool,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Self, EngineError> {
        if !root.is_dir() {
            return Err(EngineError::MirrorRootNotFound { path: root });
        }
        Ok(Mirror {
            root,
            is_source,
            algorithm,
            libraries: BTreeMap::new(),
        })
    }

    /// The source-side mirror. The root must exist.
    pub fn source(root: PathBuf, algorithm: ChecksumAlgorithm) -> Result<Self, EngineError> {
        Self::new(root, true, algorithm)
    }

    /// The backup-side mirror. The root must exist.
    pub fn backup(root: PathBuf, algorithm: ChecksumAlgorithm) -> Result<Self, EngineError> {
        Self::new(root, false, algorithm)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_source(&self) -> bool {
        self.is_source
    }

    pub fn libraries(&self) -> &BTreeMap<String, Library> {
        &self.libraries
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    pub fn library_mut(&mut self, name: &str) -> Option<&mut Library> {
        self.libraries.get_mut(name)
    }

    /// Register the named library.
    ///
    /// On a source mirror the library directory must already exist; on a
    /// backup mirror it is created when missing.
    pub fn load_library(&mut self, name: &str) -> Result<(), EngineError> {
        let library_path = self.root.join(name);

        if !library_path.is_dir() {
            if self.is_source {
                return Err(EngineError::LibraryNotFound { path: library_path });
            }
            log::info!("provisioning backup library directory {}", library_path.display());
            fs::create_dir_all(&library_path).map_err(|e| EngineError::DirectoryCreationFailed {
                path: library_path.clone(),
                source: e,
            })?;
        }

        self.libraries.insert(
            name.to_string(),
            Library::new(name.to_string(), library_path, self.is_source, self.algorithm),
        );
        Ok(())
    }
}
