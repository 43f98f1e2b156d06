//! Disk Store Module
//!
//! Synchronous file-per-key storage underneath `ExpiringCache`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::cache::{CacheEntry, MAX_FILE_STEM_LENGTH};
use crate::error::CacheError;

// == Disk Store ==
/// Stores each cache entry as a JSON file named after its escaped key.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a reader sees either the old record or the new one.
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Directory where cache files are stored
    dir: PathBuf,
}

/// Key and expiry of a record, used when sweeping without knowing `V`.
#[derive(Deserialize)]
struct RecordHeader {
    key: String,
    expires_at: DateTime<Utc>,
}

impl DiskStore {
    // == Constructor ==
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let stem = escape_key(key);
        if stem.len() > MAX_FILE_STEM_LENGTH {
            return Err(CacheError::KeyTooLong(stem.len()));
        }
        Ok(self.dir.join(format!("{}.json", stem)))
    }

    // == Write ==
    /// Persists an already-encoded record for `key`, replacing any previous one.
    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    // == Read ==
    /// Reads and decodes the record for `key`.
    ///
    /// Returns `Ok(None)` when no file exists.
    pub fn read<V: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry<V> = serde_json::from_slice(&bytes)?;
        if entry.key != key {
            return Err(CacheError::KeyMismatch {
                expected: key.to_string(),
                found: entry.key,
            });
        }
        Ok(Some(entry))
    }

    // == Remove ==
    /// Deletes the file for `key`. Returns whether a file was removed.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // == Sweep Helpers ==
    /// Keys of every record file in the directory, stale ones included.
    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .record_paths()?
            .iter()
            .filter_map(|path| path.file_stem()?.to_str())
            .filter_map(unescape_key)
            .collect())
    }

    /// Deletes the record for `key` if it is stale at `now` or no longer
    /// decodes. Returns whether a file was removed.
    pub fn remove_if_stale(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CacheError> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let stale = match serde_json::from_slice::<RecordHeader>(&bytes) {
            Ok(header) => header.key != key || now > header.expires_at,
            Err(_) => true,
        };
        if stale {
            self.remove(key)
        } else {
            Ok(false)
        }
    }

    // == Length ==
    /// Number of record files currently on disk, stale ones included.
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.record_paths()?.len())
    }

    fn record_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

// == Key Escaping ==
/// Maps an arbitrary key to a file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, so distinct keys never share a file.
pub fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Inverse of [`escape_key`]. Returns `None` for stems it could not have produced.
pub fn unescape_key(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut iter = stem.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hi = (iter.next()? as char).to_digit(16)?;
            let lo = (iter.next()? as char).to_digit(16)?;
            bytes.push((hi * 16 + lo) as u8);
        } else if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            bytes.push(byte);
        } else {
            return None;
        }
    }
    String::from_utf8(bytes).ok()
}
