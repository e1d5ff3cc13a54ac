//! Cache entry definitions.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One known content-addressed file.
///
/// Invariant: the index holds at most one entry per `hash`, and the bytes
/// at `path` hash to `hash` unless the entry is pending reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fixed-length hex content digest; immutable identity.
    pub hash: String,
    /// Absolute location of the content, either in the source resource
    /// tree or in the cache-storage directory.
    pub path: PathBuf,
    /// File size in bytes, used for budget accounting.
    pub size: u64,
    /// Last-write time as unix seconds; cheap change detection without
    /// rehashing.
    pub last_write_time: i64,
}

impl CacheEntry {
    /// Build an entry from a file's current on-disk metadata.
    ///
    /// # Errors
    ///
    /// Fails if the file's metadata cannot be read.
    pub fn from_file(hash: String, path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            hash,
            path: path.to_path_buf(),
            size: metadata.len(),
            last_write_time: system_time_to_unix(metadata.modified()?),
        })
    }
}

/// Convert a `SystemTime` to unix seconds, clamping pre-epoch times to 0.
pub fn system_time_to_unix(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_captures_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mdl");
        File::create(&path).unwrap().write_all(b"12345").unwrap();

        let entry = CacheEntry::from_file("ab".repeat(32), &path).unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(entry.path, path);
        assert!(entry.last_write_time > 0);
    }

    #[test]
    fn test_system_time_epoch_is_zero() {
        assert_eq!(system_time_to_unix(UNIX_EPOCH), 0);
    }
}
