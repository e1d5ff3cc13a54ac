//! Application wiring for the rescache binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::cli::Cli;
use crate::error::ExitCode;
use crate::index::CacheIndex;
use crate::progress::ScanProgressBar;
use crate::provider::StaticProvider;
use crate::scheduler::{CancelToken, ScanScheduler};
use crate::settings::{default_index_path, SettingsStore};
use crate::signal::{install_handler, ShutdownHandler};
use crate::{evictor, logging};

/// Run the application with the parsed CLI arguments.
///
/// # Errors
///
/// Fails on startup problems only (unreadable index database, cache
/// directory that cannot be created); once the scheduler is running,
/// everything degrades to per-cycle retries.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let settings = Arc::new(SettingsStore::load());
    settings.update(|s| {
        if let Some(dir) = &cli.cache_dir {
            s.cache_dir = dir.clone();
        }
        if let Some(max) = cli.max_cache_size {
            s.max_cache_bytes = max;
        }
        if let Some(interval) = cli.interval {
            s.scan_interval_secs = interval.max(1);
        }
        if cli.paused {
            s.scan_paused = true;
        }
    });

    if cli.recalculate {
        let size = evictor::recalculate_cache_size(&settings.get().cache_dir)
            .context("Failed to measure cache directory")?;
        println!("{} ({} bytes)", ByteSize(size), size);
        return Ok(ExitCode::Success);
    }

    let cache_dir = settings.get().cache_dir;
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;

    let index_path = cli.index_db.clone().unwrap_or_else(default_index_path);
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let index = Arc::new(
        CacheIndex::open(&index_path)
            .with_context(|| format!("Failed to open index at {}", index_path.display()))?,
    );
    log::info!(
        "Index at {} with {} entries",
        index_path.display(),
        index.len().unwrap_or(0)
    );

    let source_dir = cli
        .source_dir
        .clone()
        .context("Source directory is required")?;
    let provider = Arc::new(StaticProvider::new(source_dir));
    let scheduler = ScanScheduler::new(index, provider, settings);

    let handler = install_handler()?;

    if cli.once {
        return run_once(&scheduler, &handler);
    }
    run_daemon(&scheduler, &handler, cli.quiet)
}

/// Single synchronous evict + reconcile cycle.
fn run_once(scheduler: &ScanScheduler, handler: &ShutdownHandler) -> Result<ExitCode> {
    let token = CancelToken::new();
    spawn_signal_bridge(handler.clone(), token.clone());

    let outcome = scheduler.run_once(&token);
    log::info!("Cycle finished: {:?}", outcome);

    if token.is_cancelled() {
        Ok(ExitCode::Interrupted)
    } else {
        Ok(ExitCode::Success)
    }
}

/// Run the scheduler until Ctrl+C.
fn run_daemon(
    scheduler: &ScanScheduler,
    handler: &ShutdownHandler,
    quiet: bool,
) -> Result<ExitCode> {
    scheduler.invoke_scan(false);

    let bar = ScanProgressBar::new(quiet);
    while !handler.is_shutdown_requested() {
        bar.update(scheduler.current_progress());
        std::thread::sleep(Duration::from_millis(200));
    }
    bar.finish();

    scheduler.shutdown();
    log::info!("Scheduler stopped");
    Ok(ExitCode::Interrupted)
}

/// Relay the process shutdown flag into a scan cancellation token.
fn spawn_signal_bridge(handler: ShutdownHandler, token: CancelToken) {
    std::thread::spawn(move || {
        while !handler.is_shutdown_requested() {
            if token.wait_timeout(Duration::from_millis(100)) {
                return;
            }
        }
        token.cancel();
    });
}
