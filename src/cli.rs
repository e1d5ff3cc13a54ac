//! Command-line interface definitions.
//!
//! The binary is a single-purpose daemon: point it at a source resource
//! directory and it keeps the content-addressed cache reconciled and under
//! budget until interrupted.
//!
//! # Example
//!
//! ```bash
//! # Run the maintenance daemon over a resource tree
//! rescache /srv/game/resources --cache-dir /var/cache/rescache --max-cache-size 10GiB
//!
//! # Single synchronous evict + reconcile cycle
//! rescache /srv/game/resources --once
//!
//! # Just report the current cache directory size
//! rescache --recalculate
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Content-addressed resource cache maintenance.
///
/// Periodically reconciles a persistent index against a source resource
/// tree and a content-addressed cache-storage directory, evicting
/// least-recently-used cache files to stay under a size budget.
#[derive(Debug, Parser)]
#[command(name = "rescache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source resource directory to reconcile against
    #[arg(value_name = "SOURCE_DIR", required_unless_present = "recalculate")]
    pub source_dir: Option<PathBuf>,

    /// Cache-storage directory (defaults to the platform cache dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum aggregate cache size (e.g., 512MiB, 10GiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_cache_size: Option<u64>,

    /// Seconds between scan cycles
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Start with scanning administratively paused
    ///
    /// Eviction still runs, and an eviction that deletes anything forces
    /// a reconcile for that cycle.
    #[arg(long)]
    pub paused: bool,

    /// Path to the index database (defaults to the platform data dir)
    #[arg(long, value_name = "FILE")]
    pub index_db: Option<PathBuf>,

    /// Run a single evict + reconcile cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Print the current cache directory size and exit
    #[arg(long)]
    pub recalculate: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB.
/// Case-insensitive; numbers without a suffix are bytes.
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid or
/// negative number, or an unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;
    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1 << 10,
        "MB" | "M" => 1_000_000,
        "MIB" => 1 << 20,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1 << 30,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1 << 40,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
