//! Least-recently-used eviction for the cache-storage directory.
//!
//! The cache-storage directory holds content-addressed files written by
//! the transfer subsystem. This module keeps its aggregate size under the
//! configured budget by deleting the least-recently-accessed files first.
//! Only the flat cache-storage directory is ever touched; the source
//! resource tree is never a deletion candidate.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytesize::ByteSize;

/// One eviction candidate from the cache-storage directory.
#[derive(Debug, Clone)]
struct CacheFile {
    path: PathBuf,
    size: u64,
    last_access: SystemTime,
}

/// Sum the sizes of regular files directly inside `cache_dir`.
///
/// A missing directory counts as zero bytes; per-file metadata failures
/// are logged and skipped.
///
/// # Errors
///
/// Fails only if the directory exists but cannot be listed.
pub fn recalculate_cache_size(cache_dir: &Path) -> std::io::Result<u64> {
    if !cache_dir.is_dir() {
        return Ok(0);
    }

    let mut total = 0u64;
    for entry in std::fs::read_dir(cache_dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable cache dir entry: {}", e);
                continue;
            }
        };
        match entry.metadata() {
            Ok(m) if m.is_file() => total += m.len(),
            Ok(_) => {}
            Err(e) => {
                log::warn!(
                    "Skipping cache file with unreadable metadata {}: {}",
                    entry.path().display(),
                    e
                );
            }
        }
    }
    Ok(total)
}

/// Enforce the cache size budget, deleting least-recently-accessed files
/// until the aggregate size is at or under `max_bytes`.
///
/// Returns `true` whenever eviction ran; the scheduler uses this to force
/// an immediate reconcile, since eviction changes cache membership.
/// Individual deletion failures (file in use, permission) are logged and
/// skipped; the loop continues so the budget is still pursued best-effort.
///
/// # Errors
///
/// Fails only if the cache directory exists but cannot be enumerated.
pub fn enforce_budget(cache_dir: &Path, max_bytes: u64) -> std::io::Result<bool> {
    let mut files = collect_cache_files(cache_dir)?;
    let mut total: u64 = files.iter().map(|f| f.size).sum();

    if total <= max_bytes {
        log::debug!(
            "Cache size {} within budget {}, no eviction",
            ByteSize(total),
            ByteSize(max_bytes)
        );
        return Ok(false);
    }

    log::info!(
        "Cache size {} exceeds budget {}, evicting least-recently-used files",
        ByteSize(total),
        ByteSize(max_bytes)
    );

    // Least-recently-accessed first; ties broken by path for a stable order.
    files.sort_by(|a, b| {
        a.last_access
            .cmp(&b.last_access)
            .then_with(|| a.path.cmp(&b.path))
    });

    for file in &files {
        if total <= max_bytes {
            break;
        }
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                total = total.saturating_sub(file.size);
                log::info!(
                    "Evicted {} ({}), cache now {}",
                    file.path.display(),
                    ByteSize(file.size),
                    ByteSize(total)
                );
            }
            Err(e) => {
                log::warn!("Failed to evict {}: {}", file.path.display(), e);
            }
        }
    }

    if total > max_bytes {
        log::warn!(
            "Cache still over budget after eviction: {} > {}",
            ByteSize(total),
            ByteSize(max_bytes)
        );
    }

    Ok(true)
}

fn collect_cache_files(cache_dir: &Path) -> std::io::Result<Vec<CacheFile>> {
    let mut files = Vec::new();
    if !cache_dir.is_dir() {
        log::debug!(
            "Cache directory {} does not exist, nothing to evict",
            cache_dir.display()
        );
        return Ok(files);
    }

    for entry in std::fs::read_dir(cache_dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable cache dir entry: {}", e);
                continue;
            }
        };
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!(
                    "Skipping cache file with unreadable metadata {}: {}",
                    entry.path().display(),
                    e
                );
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        // Filesystems without atime tracking fall back to the epoch, which
        // simply sorts those files first.
        let last_access = metadata.accessed().unwrap_or(UNIX_EPOCH);
        files.push(CacheFile {
            path: entry.path(),
            size: metadata.len(),
            last_access,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, len: usize, atime_secs: i64) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(&vec![0u8; len]).unwrap();
        filetime::set_file_atime(&path, FileTime::from_unix_time(atime_secs, 0)).unwrap();
        path
    }

    #[test]
    fn test_under_budget_is_untouched() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a", 100, 1_000);
        write_file(dir.path(), "b", 100, 2_000);

        let triggered = enforce_budget(dir.path(), 1_000).unwrap();
        assert!(!triggered);
        assert_eq!(recalculate_cache_size(dir.path()).unwrap(), 200);
    }

    #[test]
    fn test_evicts_least_recently_accessed_first() {
        let dir = TempDir::new().unwrap();
        let oldest = write_file(dir.path(), "oldest", 100, 1_000);
        let middle = write_file(dir.path(), "middle", 100, 2_000);
        let newest = write_file(dir.path(), "newest", 100, 3_000);

        // Budget of 200 forces exactly one deletion.
        let triggered = enforce_budget(dir.path(), 200).unwrap();
        assert!(triggered);
        assert!(!oldest.exists());
        assert!(middle.exists());
        assert!(newest.exists());
    }

    #[test]
    fn test_evicts_until_under_budget() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            write_file(dir.path(), &format!("f{i}"), 100, i);
        }

        let triggered = enforce_budget(dir.path(), 350).unwrap();
        assert!(triggered);
        assert!(recalculate_cache_size(dir.path()).unwrap() <= 350);
        // Newest three survive.
        assert!(dir.path().join("f9").exists());
        assert!(dir.path().join("f8").exists());
        assert!(dir.path().join("f7").exists());
    }

    #[test]
    fn test_missing_directory_is_zero_and_untriggered() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(recalculate_cache_size(&missing).unwrap(), 0);
        assert!(!enforce_budget(&missing, 10).unwrap());
    }

    #[test]
    fn test_subdirectories_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        write_file(dir.path(), "a", 50, 1_000);

        assert_eq!(recalculate_cache_size(dir.path()).unwrap(), 50);
        assert!(!enforce_budget(dir.path(), 100).unwrap());
    }
}
