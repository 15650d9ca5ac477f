//! On-disk manifest records
//!
//! One file per source locator, named after the upper-case hex SHA-256 of
//! the locator and holding the last manifest successfully fetched for it:
//!
//! ```text
//! <cache_dir>/
//! ├── 3F1A…9C.json
//! └── 8B02…E4.json
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::repository::error::CacheError;

const RECORD_EXTENSION: &str = "json";

/// Stable record key for a source locator
pub fn record_key(locator: &str) -> String {
    hex::encode_upper(Sha256::digest(locator.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory if it does not exist yet
    pub fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))
    }

    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    /// Keys of every record present on disk, sorted.
    ///
    /// A missing directory holds no records.
    pub fn keys(&self) -> Result<BTreeSet<String>, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let mut keys = BTreeSet::new();
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.insert(stem.to_string());
            }
        }
        Ok(keys)
    }

    /// Read a record; `Ok(None)` when it does not exist
    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.record_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Replace a record atomically (write to a temporary file, then rename)
    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.record_path(key);
        let tmp = self.dir.join(format!("{}.tmp", key));

        fs::write(&tmp, bytes).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))?;

        debug!("Wrote cache record {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Delete a record; deleting a missing record is not an error
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed cache record {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }
}
