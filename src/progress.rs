//! Terminal progress display using indicatif.
//!
//! The daemon polls [`crate::scheduler::ScanScheduler::current_progress`]
//! and feeds the snapshots to a single progress bar: a file counter while
//! a scan runs, a countdown message while waiting for the next cycle.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::scheduler::ScanProgress;

/// Progress bar for the scan/wait cycle.
pub struct ScanProgressBar {
    bar: ProgressBar,
}

impl ScanProgressBar {
    /// Create the bar; `quiet` yields a hidden bar so callers need no
    /// special-casing.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        Self { bar }
    }

    /// Render one progress snapshot.
    pub fn update(&self, progress: ScanProgress) {
        if progress.is_running || progress.files_total > 0 {
            self.bar.set_length(progress.files_total as u64);
            self.bar.set_position(progress.files_done as u64);
            self.bar.set_message("scanning");
        } else {
            self.bar.set_length(0);
            self.bar.set_position(0);
            self.bar.set_message(format!(
                "idle, next scan in {}s",
                progress.seconds_until_next_scan
            ));
        }
    }

    /// Clear the bar.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_accepts_updates() {
        let bar = ScanProgressBar::new(true);
        bar.update(ScanProgress {
            files_done: 1,
            files_total: 10,
            is_running: true,
            seconds_until_next_scan: 0,
        });
        bar.update(ScanProgress {
            files_done: 0,
            files_total: 0,
            is_running: false,
            seconds_until_next_scan: 60,
        });
        bar.finish();
    }
}
