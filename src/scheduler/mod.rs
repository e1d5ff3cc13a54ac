//! Background scan scheduling.
//!
//! The scheduler drives periodic eviction + reconciliation on a long-lived
//! background thread, moving between three states: idle, scanning, and
//! waiting for the next cycle. Each loop iteration runs the evictor first;
//! if eviction deleted anything, the same cycle's reconcile is forced even
//! when scanning is administratively paused, because eviction changed
//! cache membership.
//!
//! Every loop run owns one cancellation token. An explicit invoke cancels
//! the current loop and starts a fresh one, which first waits for the old
//! loop to unwind so the two never write the shared progress state at
//! once; a transfer-started signal cancels the loop outright (filesystem
//! contention avoidance) and a transfer-finished signal issues a forced
//! invoke. Disposal only cancels the token; the loop thread observes it
//! and exits on its own.

pub mod state;

pub use state::{CancelToken, ScanProgress, ScanState};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::evictor;
use crate::index::CacheIndex;
use crate::provider::ResourceProvider;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::settings::SettingsStore;

/// Token and thread of one loop run. The thread handle is kept so the
/// next loop can join it before reusing the shared scan state.
struct LoopHandle {
    token: CancelToken,
    thread: std::thread::JoinHandle<()>,
}

struct SchedulerInner {
    state: Arc<ScanState>,
    provider: Arc<dyn ResourceProvider>,
    settings: Arc<SettingsStore>,
    reconciler: Reconciler,
    current: Mutex<Option<LoopHandle>>,
}

/// Owner of the background scan loop.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rescache::index::CacheIndex;
/// use rescache::provider::StaticProvider;
/// use rescache::scheduler::ScanScheduler;
/// use rescache::settings::{Settings, SettingsStore};
///
/// let index = Arc::new(CacheIndex::open_in_memory().unwrap());
/// let provider = Arc::new(StaticProvider::new("/srv/resources"));
/// let settings = Arc::new(SettingsStore::in_memory(Settings::default()));
///
/// let scheduler = ScanScheduler::new(index, provider, settings);
/// scheduler.invoke_scan(false);
/// let progress = scheduler.current_progress();
/// println!("{}/{} files", progress.files_done, progress.files_total);
/// ```
pub struct ScanScheduler {
    inner: Arc<SchedulerInner>,
}

impl ScanScheduler {
    /// Create a scheduler in the idle state. No thread runs until
    /// [`ScanScheduler::invoke_scan`] is called.
    #[must_use]
    pub fn new(
        index: Arc<CacheIndex>,
        provider: Arc<dyn ResourceProvider>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let state = Arc::new(ScanState::new());
        let reconciler = Reconciler::new(index, Arc::clone(&state));
        Self::with_reconciler(provider, settings, state, reconciler)
    }

    /// Create a scheduler around a pre-configured reconciler. Tests use
    /// this to shrink chunk sizes and yields.
    #[must_use]
    pub fn with_reconciler(
        provider: Arc<dyn ResourceProvider>,
        settings: Arc<SettingsStore>,
        state: Arc<ScanState>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state,
                provider,
                settings,
                reconciler,
                current: Mutex::new(None),
            }),
        }
    }

    /// (Re)start the scheduler loop, cancelling any loop already running.
    /// The new loop lets the cancelled one unwind completely before it
    /// baselines any progress state.
    ///
    /// With `forced`, the next cycle reconciles even while scanning is
    /// administratively paused.
    pub fn invoke_scan(&self, forced: bool) {
        if forced {
            self.inner.state.request_force();
        }

        let token = CancelToken::new();
        let mut current = self.inner.current.lock().expect("scheduler lock poisoned");
        let previous = current.take();
        if let Some(previous) = &previous {
            previous.token.cancel();
        }

        let inner = Arc::clone(&self.inner);
        let loop_token = token.clone();
        let spawned = std::thread::Builder::new()
            .name("rescache-scan".into())
            .spawn(move || {
                // The old loop writes the same ScanState until it exits;
                // starting before then would let its cleanup clobber this
                // run's counters and scanning flag.
                if let Some(previous) = previous {
                    let _ = previous.thread.join();
                }
                run_loop(&inner, &loop_token);
            });
        match spawned {
            Ok(thread) => *current = Some(LoopHandle { token, thread }),
            Err(e) => log::error!("Failed to spawn scan loop thread: {}", e),
        }
    }

    /// A transfer began: stop the current scan/wait immediately so the
    /// transfer gets the filesystem to itself. The loop is not restarted;
    /// [`ScanScheduler::notify_transfer_finished`] does that.
    pub fn notify_transfer_started(&self) {
        log::debug!("Transfer started, cancelling scan loop");
        let current = self.inner.current.lock().expect("scheduler lock poisoned");
        if let Some(handle) = current.as_ref() {
            handle.token.cancel();
        }
    }

    /// A transfer finished: new cache content may exist, rescan now even
    /// if paused.
    pub fn notify_transfer_finished(&self) {
        log::debug!("Transfer finished, forcing rescan");
        self.invoke_scan(true);
    }

    /// Live progress snapshot for observability/UI.
    #[must_use]
    pub fn current_progress(&self) -> ScanProgress {
        self.inner.state.snapshot()
    }

    /// On-demand aggregate size of the cache-storage directory.
    ///
    /// # Errors
    ///
    /// Fails if the cache directory exists but cannot be listed.
    pub fn recalculate_cache_size(&self) -> std::io::Result<u64> {
        evictor::recalculate_cache_size(&self.inner.settings.get().cache_dir)
    }

    /// Run a single evict + reconcile cycle synchronously on the calling
    /// thread. Returns `None` if the cycle skipped reconciling (paused,
    /// or the reconcile errored out for this cycle).
    pub fn run_once(&self, token: &CancelToken) -> Option<ReconcileOutcome> {
        run_cycle(&self.inner, token)
    }

    /// Cancel the loop without waiting for it to exit. The handle stays
    /// registered so a later invoke still fences against the exiting
    /// thread.
    pub fn shutdown(&self) {
        let current = self.inner.current.lock().expect("scheduler lock poisoned");
        if let Some(handle) = current.as_ref() {
            handle.token.cancel();
        }
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One iteration of the scheduler body: evict, then maybe reconcile.
fn run_cycle(inner: &SchedulerInner, token: &CancelToken) -> Option<ReconcileOutcome> {
    let settings = inner.settings.get();

    let evicted = match evictor::enforce_budget(&settings.cache_dir, settings.max_cache_bytes) {
        Ok(triggered) => triggered,
        Err(e) => {
            log::warn!("Eviction pass failed: {}", e);
            false
        }
    };

    let forced = inner.state.take_force_requested();
    if evicted {
        log::info!("Eviction changed cache membership, reconciling this cycle");
    }
    if !evicted && !forced && settings.scan_paused {
        log::debug!("Scanning paused, skipping reconcile this cycle");
        return None;
    }

    let source_dir = if inner.provider.is_ready() {
        inner.provider.current_source_dir()
    } else {
        None
    };

    inner.state.set_scanning(true);
    let outcome = inner
        .reconciler
        .reconcile(source_dir.as_deref(), &settings.cache_dir, token);
    inner.state.set_scanning(false);

    match outcome {
        Ok(outcome) => {
            if outcome == ReconcileOutcome::Completed {
                inner.settings.mark_initial_scan_complete();
            }
            Some(outcome)
        }
        Err(e) => {
            log::error!("Reconcile failed this cycle: {}", e);
            None
        }
    }
}

/// The long-lived background loop. Exits only when its token is cancelled.
fn run_loop(inner: &SchedulerInner, token: &CancelToken) {
    log::debug!("Scan scheduler loop started");
    loop {
        if token.is_cancelled() {
            break;
        }

        run_cycle(inner, token);

        if token.is_cancelled() {
            break;
        }

        // Inter-cycle wait, decremented once per second purely for
        // observability, interruptible at one-second granularity.
        let interval = inner.settings.get().scan_interval_secs.max(1);
        let mut cancelled = false;
        for remaining in (1..=interval).rev() {
            inner.state.set_countdown(remaining);
            if token.wait_timeout(Duration::from_secs(1)) {
                cancelled = true;
                break;
            }
        }
        inner.state.set_countdown(0);
        if cancelled {
            break;
        }
    }
    inner.state.set_scanning(false);
    inner.state.set_countdown(0);
    log::debug!("Scan scheduler loop stopped");
}
