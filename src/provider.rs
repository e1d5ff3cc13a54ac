//! Resource-directory provider seam.
//!
//! The host application knows where source resources live and when that
//! location becomes usable; this core only consumes that knowledge through
//! a narrow trait, injected at construction. The readiness "event" is the
//! host calling [`crate::scheduler::ScanScheduler::invoke_scan`] once
//! readiness flips to true.

use std::path::{Path, PathBuf};

/// Supplies the current source resource directory, if any.
pub trait ResourceProvider: Send + Sync {
    /// The directory holding source resource files, or `None` while the
    /// host integration has not produced one yet.
    fn current_source_dir(&self) -> Option<PathBuf>;

    /// Whether the provider considers itself ready to be scanned.
    fn is_ready(&self) -> bool;
}

/// Provider over a fixed directory; what the standalone binary uses.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    dir: PathBuf,
}

impl StaticProvider {
    /// Create a provider that always reports `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The wrapped directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ResourceProvider for StaticProvider {
    fn current_source_dir(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }

    fn is_ready(&self) -> bool {
        self.dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_static_provider_readiness_tracks_directory() {
        let dir = TempDir::new().unwrap();
        let provider = StaticProvider::new(dir.path());
        assert!(provider.is_ready());
        assert_eq!(provider.current_source_dir(), Some(dir.path().to_path_buf()));

        let missing = StaticProvider::new("/nonexistent/resources/98765");
        assert!(!missing.is_ready());
    }
}
