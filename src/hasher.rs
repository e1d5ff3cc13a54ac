//! BLAKE3 content hashing for cache identity.
//!
//! # Overview
//!
//! Every file tracked by the cache is identified by the BLAKE3 hash of its
//! bytes, rendered as a fixed-length lowercase hex string. That string is
//! both the index key and, inside the cache-storage directory, the literal
//! filename of the cached content.
//!
//! Large files are hashed through a memory-mapped fast path; smaller files
//! use a plain streaming read.

use std::fs::File;
use std::path::{Path, PathBuf};

/// Length in characters of a hex-encoded BLAKE3 digest.
///
/// Filenames in the cache-storage directory must be exactly this long;
/// this is a wire-level contract with the transfer subsystem and must not
/// change independently.
pub const DIGEST_HEX_LEN: usize = 64;

/// File size above which hashing switches to the memory-mapped path.
const DEFAULT_MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Errors that can occur while hashing a file.
///
/// All of these mean "skip this file this cycle" to callers; a file that
/// cannot be read now (locked, deleted mid-read, permission) will be
/// reconsidered on the next scan.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file disappeared between enumeration and hashing.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other I/O error while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match source.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Content hasher producing fixed-length hex digests.
///
/// # Example
///
/// ```no_run
/// use rescache::hasher::Hasher;
/// use std::path::Path;
///
/// let hasher = Hasher::new();
/// let digest = hasher.hash_file(Path::new("model.mdl")).unwrap();
/// assert_eq!(digest.len(), rescache::hasher::DIGEST_HEX_LEN);
/// ```
#[derive(Debug, Clone)]
pub struct Hasher {
    use_mmap: bool,
    mmap_threshold: u64,
}

impl Hasher {
    /// Create a hasher with the default mmap threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_mmap: true,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        }
    }

    /// Enable or disable the memory-mapped fast path.
    #[must_use]
    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    /// Set the file size above which mmap hashing is used.
    #[must_use]
    pub fn with_mmap_threshold(mut self, threshold: u64) -> Self {
        self.mmap_threshold = threshold;
        self
    }

    /// Hash the full contents of the file at `path`.
    ///
    /// Returns the lowercase hex digest, [`DIGEST_HEX_LEN`] characters long.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read. Callers
    /// treat this as a per-file skip, never as fatal.
    pub fn hash_file(&self, path: &Path) -> Result<String, HashError> {
        let metadata = std::fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;

        let mut hasher = blake3::Hasher::new();
        if self.use_mmap && metadata.len() >= self.mmap_threshold {
            hasher
                .update_mmap_rayon(path)
                .map_err(|e| HashError::from_io(path, e))?;
        } else {
            let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
            hasher
                .update_reader(file)
                .map_err(|e| HashError::from_io(path, e))?;
        }

        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}
