//! Persisted application settings.
//!
//! Settings are stored as JSON in the platform-specific config directory
//! (XDG on Linux, AppData on Windows) and mirror what the host application
//! would hand the cache core: where the cache lives, how big it may grow,
//! how often to scan, and the one-shot `initial_scan_complete` flag.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Default cache budget: 10 GiB.
const DEFAULT_MAX_CACHE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Default interval between scan cycles.
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

/// Cache maintenance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Content-addressed cache-storage directory.
    pub cache_dir: PathBuf,
    /// Aggregate size budget for `cache_dir`, in bytes.
    pub max_cache_bytes: u64,
    /// Seconds between scan cycles.
    pub scan_interval_secs: u64,
    /// Administrative pause; forced scans still run.
    pub scan_paused: bool,
    /// Set once, after the first ever scan that completes uncancelled.
    pub initial_scan_complete: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            scan_paused: false,
            initial_scan_complete: false,
        }
    }
}

/// Handle to the settings, serializing access and writing changes through
/// to disk.
///
/// A store created with [`SettingsStore::in_memory`] never touches disk;
/// tests and one-shot runs use that.
pub struct SettingsStore {
    path: Option<PathBuf>,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Load settings from the default platform path, falling back to
    /// defaults if the file is missing or unreadable.
    #[must_use]
    pub fn load() -> Self {
        let path = settings_path();
        let settings = match &path {
            Some(p) if p.exists() => match std::fs::read_to_string(p)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
            {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Failed to load settings, using defaults: {}", e);
                    Settings::default()
                }
            },
            _ => Settings::default(),
        };
        Self {
            path,
            inner: Mutex::new(settings),
        }
    }

    /// Create a store that holds `settings` without persisting them.
    #[must_use]
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            inner: Mutex::new(settings),
        }
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn get(&self) -> Settings {
        self.inner.lock().expect("settings lock poisoned").clone()
    }

    /// Apply `update` to the settings and persist the result.
    pub fn update(&self, update: impl FnOnce(&mut Settings)) {
        let mut settings = self.inner.lock().expect("settings lock poisoned");
        update(&mut settings);
        if let Err(e) = self.persist(&settings) {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    /// Record that the first ever scan has completed. Persisted once;
    /// subsequent calls are no-ops.
    pub fn mark_initial_scan_complete(&self) {
        let mut settings = self.inner.lock().expect("settings lock poisoned");
        if settings.initial_scan_complete {
            return;
        }
        settings.initial_scan_complete = true;
        log::info!("Initial scan complete");
        if let Err(e) = self.persist(&settings) {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    fn persist(&self, settings: &Settings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn settings_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "rescache", "rescache")
        .map(|dirs| dirs.config_dir().join("settings.json"))
}

fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("io", "rescache", "rescache")
        .map(|dirs| dirs.cache_dir().join("storage"))
        .unwrap_or_else(|| PathBuf::from("rescache-storage"))
}

/// Default location for the index database file.
#[must_use]
pub fn default_index_path() -> PathBuf {
    ProjectDirs::from("io", "rescache", "rescache")
        .map(|dirs| dirs.data_dir().join("index.db"))
        .unwrap_or_else(|| PathBuf::from("rescache-index.db"))
}
