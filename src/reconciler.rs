//! Two-pass reconciliation of the cache index against filesystem state.
//!
//! # Overview
//!
//! A reconcile brings the persistent index into agreement with what is
//! actually on disk, across two views: the recursive source resource tree
//! and the flat content-addressed cache-storage directory.
//!
//! 1. **Validation pass**: every known index entry is checked against the
//!    live file at its recorded path. Unchanged files are marked matched;
//!    vanished files lose their entry; files with a changed write time are
//!    rehashed and their entry refreshed.
//! 2. **Discovery pass**: every on-disk file that matched no entry is
//!    hashed and indexed at its current location. This covers both new
//!    source files and orphaned-but-valid cache-storage content. A file
//!    whose content is already indexed and was validated at another path
//!    this scan (a cached copy of a live source file, or duplicate
//!    content) leaves the existing entry alone.
//!
//! Both passes run with bounded parallelism: files are processed in fixed
//! chunks by a worker pool capped below the machine's full core count,
//! with a short yield and a cancellation check between chunks. A single
//! bad file never aborts a pass; it is logged, skipped, and reconsidered
//! next cycle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::hasher::{Hasher, DIGEST_HEX_LEN};
use crate::index::entry::system_time_to_unix;
use crate::index::{CacheEntry, CacheIndex, IndexResult};
use crate::scheduler::{CancelToken, ScanState};

/// File extensions (lower-case, no dot) eligible for caching.
///
/// Only real resource payloads are cached; everything else in the source
/// tree is noise for our purposes.
pub const RESOURCE_EXTENSIONS: &[&str] =
    &["mdl", "tex", "ter", "mat", "anm", "snd", "wav", "ogg", "fx"];

/// Source-tree subdirectories whose contents never need caching
/// (background/common/UI assets ship with every client).
pub const EXCLUDED_SUBDIRS: &[&str] = &["background", "common", "ui"];

/// Pause between chunks so a long reconcile never starves the host.
const CHUNK_YIELD: Duration = Duration::from_millis(10);

/// How a reconcile call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Both passes ran to the end; progress counters were reset.
    Completed,
    /// The cancellation token fired at a chunk boundary; counters were
    /// left standing and the index holds only pre-scan or fully-updated
    /// entries.
    Cancelled,
    /// A directory was unset or missing. Frequent and recoverable while
    /// the host integration is not yet ready; retried next cycle.
    NotReady,
}

/// Where a scanned file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOrigin {
    SourceTree,
    CacheStorage,
}

/// One on-disk file observed at scan start, with its match flag.
#[derive(Debug)]
struct ScannedFile {
    path: PathBuf,
    origin: FileOrigin,
    matched: AtomicBool,
}

/// The per-scan mapping from normalized path to observed file.
type ScannedFileSet = HashMap<String, ScannedFile>;

/// Reconciler driving both passes against one [`CacheIndex`].
pub struct Reconciler {
    index: Arc<CacheIndex>,
    state: Arc<ScanState>,
    hasher: Hasher,
    chunk_size: usize,
    chunk_yield: Duration,
}

impl Reconciler {
    /// Create a reconciler with the default worker cap of
    /// `max(1, cores / 2)`, leaving headroom for the host's own threads.
    #[must_use]
    pub fn new(index: Arc<CacheIndex>, state: Arc<ScanState>) -> Self {
        Self {
            index,
            state,
            hasher: Hasher::new(),
            chunk_size: default_worker_count(),
            chunk_yield: CHUNK_YIELD,
        }
    }

    /// Override the chunk size / worker count. Values are clamped to 1.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Override the inter-chunk yield. Tests set this to zero.
    #[must_use]
    pub fn with_chunk_yield(mut self, yield_duration: Duration) -> Self {
        self.chunk_yield = yield_duration;
        self
    }

    /// Override the hasher, e.g. to disable the mmap path.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Run one full reconcile of `source_dir` + `cache_dir` against the
    /// index.
    ///
    /// Returns [`ReconcileOutcome::NotReady`] without touching any state
    /// when either directory is unset or missing. Per-file failures are
    /// logged and skipped; they never abort the pass.
    ///
    /// # Errors
    ///
    /// Fails only if the index snapshot itself cannot be read.
    pub fn reconcile(
        &self,
        source_dir: Option<&Path>,
        cache_dir: &Path,
        token: &CancelToken,
    ) -> IndexResult<ReconcileOutcome> {
        let Some(source_dir) = source_dir else {
            log::warn!("Source resource directory not yet available, skipping reconcile");
            return Ok(ReconcileOutcome::NotReady);
        };
        if !source_dir.is_dir() {
            log::warn!(
                "Source resource directory {} does not exist, skipping reconcile",
                source_dir.display()
            );
            return Ok(ReconcileOutcome::NotReady);
        }
        if !cache_dir.is_dir() {
            log::warn!(
                "Cache storage directory {} does not exist, skipping reconcile",
                cache_dir.display()
            );
            return Ok(ReconcileOutcome::NotReady);
        }

        let source_dir = std::path::absolute(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());
        let cache_dir = std::path::absolute(cache_dir).unwrap_or_else(|_| cache_dir.to_path_buf());

        // Steps 2-4: union of both filesystem views, all unmatched.
        let mut scanned: ScannedFileSet = HashMap::new();
        for path in enumerate_source_files(&source_dir) {
            insert_scanned(&mut scanned, path, FileOrigin::SourceTree);
        }
        for path in enumerate_cache_files(&cache_dir) {
            insert_scanned(&mut scanned, path, FileOrigin::CacheStorage);
        }

        log::info!(
            "Reconciling {} on-disk files against the index",
            scanned.len()
        );
        self.state.begin_scan(scanned.len());

        let pool = build_pool(self.chunk_size);

        // Step 5: validate every known entry against live disk state.
        let entries = self.index.list()?;
        let cancelled = self.run_chunked(&pool, &entries, token, |entry| {
            self.validate_entry(entry, &scanned);
        });
        if cancelled {
            log::info!("Reconcile cancelled during validation pass");
            return Ok(ReconcileOutcome::Cancelled);
        }

        // Step 6: hash and index everything that matched no entry.
        let unmatched: Vec<&ScannedFile> = scanned
            .values()
            .filter(|f| !f.matched.load(Ordering::SeqCst))
            .collect();
        log::debug!("{} files need hashing", unmatched.len());

        let cancelled = self.run_chunked(&pool, &unmatched, token, |file| {
            self.discover_file(file, &scanned);
        });
        if cancelled {
            log::info!("Reconcile cancelled during discovery pass");
            return Ok(ReconcileOutcome::Cancelled);
        }

        // Step 7: completion.
        self.state.reset_counters();
        log::info!("Reconcile complete, index holds {} entries", self.index.len()?);
        Ok(ReconcileOutcome::Completed)
    }

    /// Process `items` in fixed-size chunks on the bounded pool, with a
    /// full barrier, a short yield, and a cancellation check between
    /// chunks. Returns `true` if cancelled.
    fn run_chunked<T: Sync>(
        &self,
        pool: &rayon::ThreadPool,
        items: &[T],
        token: &CancelToken,
        work: impl Fn(&T) + Sync,
    ) -> bool {
        for chunk in items.chunks(self.chunk_size) {
            pool.install(|| chunk.par_iter().for_each(&work));
            if !self.chunk_yield.is_zero() {
                std::thread::sleep(self.chunk_yield);
            }
            if token.is_cancelled() {
                return true;
            }
        }
        false
    }

    /// Validation-pass work for one index entry.
    fn validate_entry(&self, entry: &CacheEntry, scanned: &ScannedFileSet) {
        match std::fs::metadata(&entry.path) {
            Ok(metadata) => {
                let mtime = metadata
                    .modified()
                    .map(system_time_to_unix)
                    .unwrap_or_default();
                if mtime == entry.last_write_time {
                    mark_matched(scanned, &entry.path);
                } else {
                    log::debug!(
                        "File changed since last scan, refreshing: {}",
                        entry.path.display()
                    );
                    self.refresh_entry(entry, scanned);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "Indexed file vanished, dropping entry: {}",
                    entry.path.display()
                );
                if let Err(e) = self.index.remove(&entry.hash) {
                    log::error!("Failed to remove stale entry {}: {}", entry.hash, e);
                }
            }
            Err(e) => {
                // Transient; keep the entry and retry next cycle.
                log::warn!("Cannot stat {}: {}", entry.path.display(), e);
            }
        }
        self.state.tick_progress();
    }

    /// Rehash a changed file and replace its entry.
    fn refresh_entry(&self, entry: &CacheEntry, scanned: &ScannedFileSet) {
        let new_hash = match self.hasher.hash_file(&entry.path) {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("Skipping changed file this cycle: {}", e);
                return;
            }
        };
        let fresh = match CacheEntry::from_file(new_hash.clone(), &entry.path) {
            Ok(fresh) => fresh,
            Err(e) => {
                log::warn!(
                    "Cannot read metadata for {}: {}",
                    entry.path.display(),
                    e
                );
                return;
            }
        };
        if new_hash != entry.hash {
            if let Err(e) = self.index.remove(&entry.hash) {
                log::error!("Failed to remove superseded entry {}: {}", entry.hash, e);
                return;
            }
        }
        if let Err(e) = self.index.upsert(&fresh) {
            log::error!("Failed to refresh entry {}: {}", fresh.hash, e);
            return;
        }
        mark_matched(scanned, &entry.path);
    }

    /// Discovery-pass work for one unmatched on-disk file.
    fn discover_file(&self, file: &ScannedFile, scanned: &ScannedFileSet) {
        match self.hasher.hash_file(&file.path) {
            Ok(hash) => {
                if file.origin == FileOrigin::CacheStorage {
                    let name_matches = file
                        .path
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(&hash));
                    if !name_matches {
                        log::warn!(
                            "Cache file {} does not hash to its own name; indexing by content",
                            file.path.display()
                        );
                    }
                }
                // An entry validated at another path this scan keeps the
                // hash; rewriting it would make the recorded path
                // flip-flop between copies on every cycle.
                let keep_existing = match self.index.get(&hash) {
                    Ok(Some(existing)) => is_matched(scanned, &existing.path),
                    Ok(None) => false,
                    Err(e) => {
                        log::error!("Failed to look up entry {}: {}", hash, e);
                        false
                    }
                };
                if keep_existing {
                    log::trace!(
                        "Content of {} already indexed at a validated path",
                        file.path.display()
                    );
                } else {
                    match CacheEntry::from_file(hash, &file.path) {
                        Ok(entry) => {
                            if let Err(e) = self.index.upsert(&entry) {
                                log::error!("Failed to index {}: {}", file.path.display(), e);
                            }
                        }
                        Err(e) => {
                            log::warn!(
                                "Cannot read metadata for {}: {}",
                                file.path.display(),
                                e
                            );
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Skipping file this cycle: {}", e);
            }
        }
        self.state.tick_progress();
    }
}

/// Worker cap: half the available cores, at least one.
fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(2);
    (cores / 2).max(1)
}

fn build_pool(num_threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Failed to create bounded thread pool ({e}), using default");
            rayon::ThreadPoolBuilder::new().build().expect("thread pool")
        })
}

/// Lower-cased path string used as the comparison key within one scan.
fn normalize_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn insert_scanned(scanned: &mut ScannedFileSet, path: PathBuf, origin: FileOrigin) {
    scanned.insert(
        normalize_key(&path),
        ScannedFile {
            path,
            origin,
            matched: AtomicBool::new(false),
        },
    );
}

fn mark_matched(scanned: &ScannedFileSet, path: &Path) {
    if let Some(file) = scanned.get(&normalize_key(path)) {
        file.matched.store(true, Ordering::SeqCst);
    }
}

fn is_matched(scanned: &ScannedFileSet, path: &Path) -> bool {
    scanned
        .get(&normalize_key(path))
        .is_some_and(|file| file.matched.load(Ordering::SeqCst))
}

/// Recursively list cacheable files under the source tree.
fn enumerate_source_files(source_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(source_dir) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable path during source scan: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if in_excluded_subdir(source_dir, path) {
            continue;
        }
        if !has_resource_extension(path) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files
}

/// Flat listing of the cache-storage directory, restricted to files whose
/// name length equals the digest length (the directory is strictly
/// content-addressed; anything else in it is not ours).
fn enumerate_cache_files(cache_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list cache directory {}: {}", cache_dir.display(), e);
            return files;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable cache dir entry: {}", e);
                continue;
            }
        };
        if entry.file_name().len() != DIGEST_HEX_LEN {
            continue;
        }
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    files
}

fn in_excluded_subdir(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .parent()
        .map(Path::components)
        .into_iter()
        .flatten()
        .any(|component| {
            let name = component.as_os_str().to_string_lossy();
            EXCLUDED_SUBDIRS
                .iter()
                .any(|excluded| name.eq_ignore_ascii_case(excluded))
        })
}

fn has_resource_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| RESOURCE_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(content).unwrap();
    }

    fn test_reconciler(index: &Arc<CacheIndex>) -> (Reconciler, Arc<ScanState>) {
        let state = Arc::new(ScanState::new());
        let reconciler = Reconciler::new(Arc::clone(index), Arc::clone(&state))
            .with_chunk_size(2)
            .with_chunk_yield(Duration::ZERO);
        (reconciler, state)
    }

    #[test]
    fn test_discovers_source_files() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        write_file(&source.path().join("a.mdl"), b"model a");
        write_file(&source.path().join("maps/b.tex"), b"texture b");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, state) = test_reconciler(&index);

        let outcome = reconciler
            .reconcile(Some(source.path()), cache.path(), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Completed);
        assert_eq!(index.len().unwrap(), 2);

        let expected_a = blake3::hash(b"model a").to_hex().to_string();
        let expected_b = blake3::hash(b"texture b").to_hex().to_string();
        assert!(index.get(&expected_a).unwrap().is_some());
        assert!(index.get(&expected_b).unwrap().is_some());

        // Counters reset on uncancelled completion.
        let progress = state.snapshot();
        assert_eq!(progress.files_done, 0);
        assert_eq!(progress.files_total, 0);
    }

    #[test]
    fn test_skips_excluded_subdirs_and_foreign_extensions() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        write_file(&source.path().join("keep.mdl"), b"keep");
        write_file(&source.path().join("ui/skip.mdl"), b"ui asset");
        write_file(&source.path().join("common/skip.tex"), b"common asset");
        write_file(&source.path().join("background/skip.wav"), b"bg asset");
        write_file(&source.path().join("readme.txt"), b"not a resource");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);

        reconciler
            .reconcile(Some(source.path()), cache.path(), &CancelToken::new())
            .unwrap();

        assert_eq!(index.len().unwrap(), 1);
        let hash = blake3::hash(b"keep").to_hex().to_string();
        assert!(index.get(&hash).unwrap().is_some());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        write_file(&source.path().join("a.mdl"), b"model a");
        write_file(&source.path().join("b.snd"), b"sound b");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);
        let token = CancelToken::new();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        let mut before = index.list().unwrap();
        before.sort_by(|a, b| a.hash.cmp(&b.hash));

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        let mut after = index.list().unwrap();
        after.sort_by(|a, b| a.hash.cmp(&b.hash));

        assert_eq!(before, after);
    }

    #[test]
    fn test_removes_entry_for_vanished_file() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let path = source.path().join("gone.mdl");
        write_file(&path, b"will vanish");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);
        let token = CancelToken::new();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.len().unwrap(), 1);

        fs::remove_file(&path).unwrap();
        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.len().unwrap(), 0);
    }

    #[test]
    fn test_refreshes_entry_for_changed_file() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let path = source.path().join("mutating.mdl");
        write_file(&path, b"version one");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);
        let token = CancelToken::new();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        let old_hash = blake3::hash(b"version one").to_hex().to_string();
        assert!(index.get(&old_hash).unwrap().is_some());

        write_file(&path, b"version two");
        // Push the mtime clearly away from the recorded one.
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(2_000_000_000, 0))
            .unwrap();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();

        let new_hash = blake3::hash(b"version two").to_hex().to_string();
        assert_eq!(index.len().unwrap(), 1);
        assert!(index.get(&old_hash).unwrap().is_none());
        assert!(index.get(&new_hash).unwrap().is_some());
    }

    #[test]
    fn test_indexes_orphaned_cache_file() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();

        let content = b"cached payload";
        let hash = blake3::hash(content).to_hex().to_string();
        write_file(&cache.path().join(&hash), content);
        // A stray file with a non-digest name must be ignored.
        write_file(&cache.path().join("stray.tmp"), b"junk");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);

        reconciler
            .reconcile(Some(source.path()), cache.path(), &CancelToken::new())
            .unwrap();

        assert_eq!(index.len().unwrap(), 1);
        let entry = index.get(&hash).unwrap().unwrap();
        assert_eq!(entry.path, cache.path().join(&hash));
    }

    #[test]
    fn test_cached_copy_of_source_file_is_stable_across_runs() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let content = b"shared payload";
        write_file(&source.path().join("a.mdl"), content);
        let hash = blake3::hash(content).to_hex().to_string();
        write_file(&cache.path().join(&hash), content);

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);
        let token = CancelToken::new();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.len().unwrap(), 1);
        let first = index.list().unwrap();

        // The validated entry keeps the hash; the other copy never
        // steals it back, so repeated runs change nothing.
        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.list().unwrap(), first);
        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.list().unwrap(), first);
    }

    #[test]
    fn test_duplicate_source_content_is_stable_across_runs() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        write_file(&source.path().join("copy_one.mdl"), b"same bytes");
        write_file(&source.path().join("copy_two.mdl"), b"same bytes");

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);
        let token = CancelToken::new();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.len().unwrap(), 1);
        let first = index.list().unwrap();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        assert_eq!(index.list().unwrap(), first);
    }

    #[test]
    fn test_missing_source_dir_is_not_ready() {
        let cache = TempDir::new().unwrap();
        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, state) = test_reconciler(&index);

        let outcome = reconciler
            .reconcile(
                Some(Path::new("/nonexistent/resources/12345")),
                cache.path(),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotReady);

        let outcome = reconciler
            .reconcile(None, cache.path(), &CancelToken::new())
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotReady);

        // No partial state changes.
        assert_eq!(state.snapshot().files_total, 0);
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_cancellation_leaves_counters_standing() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        for i in 0..8 {
            write_file(&source.path().join(format!("f{i}.mdl")), b"data");
        }

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, state) = test_reconciler(&index);

        let token = CancelToken::new();
        token.cancel();

        let outcome = reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Cancelled);
        assert_eq!(state.snapshot().files_total, 8);
        // At most the in-flight chunk (size 2) was processed.
        assert!(state.snapshot().files_done <= 2);
    }

    #[test]
    fn test_cancellation_keeps_index_consistent() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        for i in 0..6 {
            write_file(&source.path().join(format!("f{i}.mdl")), format!("data {i}").as_bytes());
        }

        let index = Arc::new(CacheIndex::open_in_memory().unwrap());
        let (reconciler, _state) = test_reconciler(&index);
        let token = CancelToken::new();

        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        let full: Vec<_> = index.list().unwrap();
        assert_eq!(full.len(), 6);

        // Cancel mid-way through a second run; every surviving entry must
        // still be one of the fully-written originals.
        token.cancel();
        reconciler
            .reconcile(Some(source.path()), cache.path(), &token)
            .unwrap();
        for entry in index.list().unwrap() {
            assert!(full.contains(&entry));
        }
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        assert!(has_resource_extension(Path::new("/r/A.MDL")));
        assert!(has_resource_extension(Path::new("/r/b.Tex")));
        assert!(!has_resource_extension(Path::new("/r/c.txt")));
        assert!(!has_resource_extension(Path::new("/r/noext")));
    }

    #[test]
    fn test_excluded_subdir_matching() {
        let root = Path::new("/res");
        assert!(in_excluded_subdir(root, Path::new("/res/ui/menu.tex")));
        assert!(in_excluded_subdir(root, Path::new("/res/maps/COMMON/x.mdl")));
        assert!(!in_excluded_subdir(root, Path::new("/res/maps/x.mdl")));
        // A file merely named like an excluded dir is fine.
        assert!(!in_excluded_subdir(root, Path::new("/res/ui.mdl")));
    }
}
