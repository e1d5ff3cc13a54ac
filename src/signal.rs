//! Signal handling for graceful shutdown.
//!
//! The daemon installs a Ctrl+C handler that flips a shared `AtomicBool`.
//! The main loop polls the flag and, once set, cancels the scan scheduler
//! and exits with code 130 (128 + SIGINT).

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption, per Unix convention.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Centralized shutdown handler for graceful daemon termination.
///
/// Wraps an `AtomicBool` set when a Ctrl+C signal is received; the flag
/// can be shared with worker threads for coordinated shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with the flag initially clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the shutdown flag for passing to worker threads.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Reset the flag to `false`; used by tests that reuse a handler.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C handler that sets the shutdown flag on interrupt.
///
/// Call once, early in startup. If a handler is already installed (e.g.
/// by a parallel test), the existing or an unhooked fallback handler is
/// returned instead of failing, so tests can run concurrently.
///
/// # Errors
///
/// Currently never fails; the signature is kept for callers that want to
/// treat installation as fallible.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    match ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Shutting down...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            Ok(handler)
        }
        Err(_) => {
            if let Some(handler) = GLOBAL_HANDLER.get() {
                handler.reset();
                Ok(handler.clone())
            } else {
                log::debug!("Ctrl+C handler already registered, using unhooked handler");
                let fallback = ShutdownHandler::new();
                let _ = GLOBAL_HANDLER.set(fallback.clone());
                Ok(fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_handler_starts_clear() {
        let handler = ShutdownHandler::new();
        assert!(!handler.is_shutdown_requested());
    }

    #[test]
    fn test_request_and_reset() {
        let handler = ShutdownHandler::new();
        handler.request_shutdown();
        assert!(handler.is_shutdown_requested());
        handler.reset();
        assert!(!handler.is_shutdown_requested());
    }

    #[test]
    fn test_flag_is_shared_with_clones() {
        let handler = ShutdownHandler::new();
        let flag = handler.get_flag();
        let cloned = handler.clone();

        flag.store(true, Ordering::SeqCst);
        assert!(handler.is_shutdown_requested());
        assert!(cloned.is_shutdown_requested());
    }

    #[test]
    fn test_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ShutdownHandler>();
    }
}
