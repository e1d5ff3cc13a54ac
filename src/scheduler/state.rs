//! Shared scan state and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Live counters for an in-flight scan, shared between the scheduler loop
/// and parallel reconciliation workers.
///
/// Counters are monotonically updated during a scan and reset to zero only
/// when a scan completes without cancellation. A cancelled scan leaves
/// them standing, so partial progress stays observable; whether a scan is
/// actually running is tracked separately (see [`ScanProgress::is_running`]).
#[derive(Debug, Default)]
pub struct ScanState {
    total_files: AtomicUsize,
    files_done: AtomicUsize,
    seconds_until_next_scan: AtomicU64,
    force_requested: AtomicBool,
    scanning: AtomicBool,
}

impl ScanState {
    /// Create a fresh state with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline the counters for a new scan: the total is the size of the
    /// scanned file set and the done count restarts from zero.
    pub fn begin_scan(&self, total: usize) {
        self.total_files.store(total, Ordering::SeqCst);
        self.files_done.store(0, Ordering::SeqCst);
    }

    /// Record one processed file.
    pub fn tick_progress(&self) {
        self.files_done.fetch_add(1, Ordering::SeqCst);
    }

    /// Zero the progress counters. Called only on uncancelled completion.
    pub fn reset_counters(&self) {
        self.total_files.store(0, Ordering::SeqCst);
        self.files_done.store(0, Ordering::SeqCst);
    }

    /// Update the observability countdown to the next scheduled scan.
    pub fn set_countdown(&self, seconds: u64) {
        self.seconds_until_next_scan.store(seconds, Ordering::SeqCst);
    }

    /// Request that the next cycle runs even if scanning is paused.
    /// Sticky until consumed by [`ScanState::take_force_requested`].
    pub fn request_force(&self) {
        self.force_requested.store(true, Ordering::SeqCst);
    }

    /// Consume the force flag for one cycle.
    pub fn take_force_requested(&self) -> bool {
        self.force_requested.swap(false, Ordering::SeqCst)
    }

    /// Mark whether a reconcile is currently executing.
    pub fn set_scanning(&self, scanning: bool) {
        self.scanning.store(scanning, Ordering::SeqCst);
    }

    /// Point-in-time snapshot for observability/UI.
    #[must_use]
    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            files_done: self.files_done.load(Ordering::SeqCst),
            files_total: self.total_files.load(Ordering::SeqCst),
            is_running: self.scanning.load(Ordering::SeqCst),
            seconds_until_next_scan: self.seconds_until_next_scan.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of scan progress, as exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    /// Files processed so far in the current (or last cancelled) scan.
    pub files_done: usize,
    /// Total files the scan set out to process.
    pub files_total: usize,
    /// Whether a reconcile is executing right now.
    pub is_running: bool,
    /// Countdown to the next scheduled cycle, in seconds.
    pub seconds_until_next_scan: u64,
}

/// Cooperative cancellation token threaded through every wait and checked
/// at chunk boundaries.
///
/// Cancellation never interrupts work already in flight for a chunk; it is
/// observed between chunks and inside timed waits, which wake immediately
/// when the token is cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Cancel the token, waking any thread blocked in
    /// [`CancelToken::wait_timeout`].
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().expect("cancel token lock poisoned") = true;
        cvar.notify_all();
    }

    /// Whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().expect("cancel token lock poisoned")
    }

    /// Block for up to `timeout`, returning early if cancelled.
    ///
    /// Returns `true` if the token was cancelled before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().expect("cancel token lock poisoned");
        if *cancelled {
            return true;
        }
        let (guard, _result) = cvar
            .wait_timeout(cancelled, timeout)
            .expect("cancel token lock poisoned");
        cancelled = guard;
        *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_counters_reset_only_explicitly() {
        let state = ScanState::new();
        state.begin_scan(10);
        state.tick_progress();
        state.tick_progress();

        let progress = state.snapshot();
        assert_eq!(progress.files_done, 2);
        assert_eq!(progress.files_total, 10);

        state.reset_counters();
        let progress = state.snapshot();
        assert_eq!(progress.files_done, 0);
        assert_eq!(progress.files_total, 0);
    }

    #[test]
    fn test_force_flag_is_sticky_until_taken() {
        let state = ScanState::new();
        assert!(!state.take_force_requested());

        state.request_force();
        assert!(state.take_force_requested());
        assert!(!state.take_force_requested());
    }

    #[test]
    fn test_cancel_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_wait_timeout_returns_early_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let cancelled = waiter.wait_timeout(Duration::from_secs(30));
            (cancelled, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(50));
        token.cancel();

        let (cancelled, elapsed) = handle.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_timeout_expires_without_cancel() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(10)));
    }
}
