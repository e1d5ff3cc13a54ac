//! Logging infrastructure.
//!
//! Structured logging via the `log` facade with an `env_logger` backend.
//! Log levels are determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (error only) or `--verbose` (debug/trace)
//! 3. Default: info level

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize the logging subsystem based on CLI verbosity flags.
///
/// Call once, early in startup, before any long-running work.
///
/// # Panics
///
/// Panics if called more than once, as `env_logger` can only be
/// initialized once per process.
pub fn init_logging(verbose: u8, quiet: bool) {
    let use_env = env::var("RUST_LOG").is_ok();

    let mut builder = Builder::new();
    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    configure_format(&mut builder, verbose);
    builder.init();
}

/// Determine the log level from CLI flags.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Compact format by default; timestamps and module paths once debugging.
fn configure_format(builder: &mut Builder, verbose: u8) {
    if verbose > 0 || cfg!(debug_assertions) {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.module_path().unwrap_or("?"),
                record.args()
            )
        });
    } else {
        builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    }
}
