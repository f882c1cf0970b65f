//! Vybes - evaluation harness for autonomous coding agents
//!
//! Runs each selected agent configuration against each selected evaluation,
//! archives the evidence and prints a Vybes score summary.

mod cli;
mod commands;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use cli::Cli;
use vybes_core::logging;

fn main() -> ExitCode {
    let start = Instant::now();
    let cli = Cli::parse();

    // Initialize structured logging
    if let Err(e) = logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::debug!(elapsed = ?start.elapsed(), "parse_args");

    match commands::dispatch::run(&cli, start) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(error_type = e.error_type(), error = %e, "Fatal error");
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
