//! rescache - Content-Addressed Resource Cache Maintenance
//!
//! Entry point for the rescache daemon.

use clap::Parser;
use rescache::cli::Cli;

fn main() {
    let cli = Cli::parse();

    match rescache::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(rescache::error::ExitCode::GeneralError.as_i32());
        }
    }
}
